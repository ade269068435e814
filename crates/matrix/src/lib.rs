//! purity-matrix: runs a survey across many library versions.
//!
//! Each version is provisioned in its own [`ExecutionContext`], the survey
//! program is run there, and its output is validated and written to the
//! [`ArtifactStore`]. A version whose artifact is already cached is not
//! re-run. Failed attempts are retried with backoff up to a fixed budget;
//! a version that exhausts it is reported as failed without stopping the
//! others.

pub mod backoff;
pub mod config;
pub mod context;
pub mod orchestrator;
pub mod process;
pub mod state;
pub mod store;

pub use config::{ConfigError, ContextConfig, MatrixConfig, MatrixOptions};
pub use context::{ContextError, ExecutionContext, InProcessContext, Producer};
pub use orchestrator::{FailedVersion, MatrixReport, Orchestrator};
pub use process::{ProcessContext, ProcessHandle, ProcessSpec, VERSION_ENV};
pub use state::{VersionRun, VersionState};
pub use store::{check_version, ArtifactStore, StoreError};

/// Errors that abort a whole matrix run. Per-version failures are not
/// errors; they are recorded in the [`MatrixReport`].
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("illegal transition for {version}: {from} -> {to}")]
    IllegalTransition {
        version: String,
        from: VersionState,
        to: VersionState,
    },

    #[error("matrix worker stopped unexpectedly: {0}")]
    Worker(String),
}
