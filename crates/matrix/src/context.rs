//! Isolated execution contexts.
//!
//! An [`ExecutionContext`] stands up an environment in which one version of
//! the surveyed library is installed and runs a program there whose
//! standard output is an interchange document. Contexts for different
//! versions share nothing, so a version's run cannot affect another's.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("provisioning {version} failed: {message}")]
    Provisioning { version: String, message: String },

    #[error("running {program} for {version} failed: {message}")]
    Runtime {
        version: String,
        program: String,
        message: String,
    },

    #[error("{stage} for {version} timed out after {limit:?}")]
    Timeout {
        version: String,
        stage: &'static str,
        limit: Duration,
    },
}

/// A per-version environment.
///
/// The orchestrator owns timeouts; implementations only need to do the
/// work and report failures.
#[async_trait]
pub trait ExecutionContext: Send + Sync + 'static {
    type Handle: Send + Sync;

    /// Prepare an environment with `version` installed.
    async fn provision(&self, version: &str) -> Result<Self::Handle, ContextError>;

    /// Run `program` in the environment and return its output.
    async fn run(&self, handle: &Self::Handle, program: &str) -> Result<String, ContextError>;

    /// Tear the environment down. The default keeps it.
    async fn release(&self, _handle: Self::Handle) {}
}

/// Produces the document for `(version, program)` inside this process.
pub type Producer = Arc<dyn Fn(&str, &str) -> Result<String, String> + Send + Sync>;

/// Runs a producer on the blocking pool. Each run gets a fresh call, so
/// isolation is whatever the producer itself guarantees.
#[derive(Clone)]
pub struct InProcessContext {
    producer: Producer,
}

impl InProcessContext {
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, String> + Send + Sync + 'static,
    {
        InProcessContext {
            producer: Arc::new(producer),
        }
    }
}

#[async_trait]
impl ExecutionContext for InProcessContext {
    type Handle = String;

    async fn provision(&self, version: &str) -> Result<String, ContextError> {
        Ok(version.to_string())
    }

    async fn run(&self, version: &String, program: &str) -> Result<String, ContextError> {
        let producer = self.producer.clone();
        let (v, p) = (version.clone(), program.to_string());
        let result = tokio::task::spawn_blocking(move || producer(&v, &p)).await;
        let runtime = |message: String| ContextError::Runtime {
            version: version.clone(),
            program: program.to_string(),
            message,
        };
        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(message)) => Err(runtime(message)),
            Err(join) => Err(runtime(format!("producer panicked: {}", join))),
        }
    }
}
