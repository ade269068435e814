//! Bounded worker pool over a version list.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use purity_interchange::{sort_versions, Artifact, VersionKey};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::backoff::delay_before;
use crate::config::MatrixOptions;
use crate::context::{ContextError, ExecutionContext};
use crate::state::{VersionRun, VersionState};
use crate::store::{check_version, ArtifactStore};
use crate::MatrixError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedVersion {
    pub version: String,
    pub reason: String,
    pub attempts: u32,
}

/// Outcome of a matrix run. Every list is in version order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixReport {
    /// Computed and persisted in this run.
    pub succeeded: Vec<String>,
    /// Already had a well-formed artifact.
    pub cached: Vec<String>,
    pub failed: Vec<FailedVersion>,
    /// Never started because the run was cancelled.
    pub cancelled: Vec<String>,
    pub runs: Vec<VersionRun>,
}

impl MatrixReport {
    fn build(mut runs: Vec<VersionRun>, mut cancelled: Vec<String>) -> Self {
        runs.sort_by_cached_key(|r| VersionKey::parse(&r.version));
        sort_versions(&mut cancelled);
        let mut report = MatrixReport {
            cancelled,
            ..Default::default()
        };
        for run in &runs {
            match run.state {
                VersionState::Done { cached: true } => report.cached.push(run.version.clone()),
                VersionState::Done { cached: false } => report.succeeded.push(run.version.clone()),
                _ => report.failed.push(FailedVersion {
                    version: run.version.clone(),
                    reason: run
                        .last_error
                        .clone()
                        .unwrap_or_else(|| format!("stopped in state {}", run.state)),
                    attempts: run.attempts,
                }),
            }
        }
        report.runs = runs;
        report
    }

    /// True if every requested version has an artifact.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    /// Versions with an artifact after the run, in version order.
    pub fn available(&self) -> Vec<String> {
        let mut versions: Vec<String> = self
            .succeeded
            .iter()
            .chain(&self.cached)
            .cloned()
            .collect();
        sort_versions(&mut versions);
        versions
    }
}

/// Runs every requested version through its execution context and
/// persists the result, at most `jobs` versions at a time.
pub struct Orchestrator<C> {
    context: Arc<C>,
    store: Arc<ArtifactStore>,
    options: MatrixOptions,
    cancel: Option<watch::Receiver<bool>>,
}

impl<C: ExecutionContext> Orchestrator<C> {
    pub fn new(context: C, store: ArtifactStore, options: MatrixOptions) -> Self {
        Orchestrator {
            context: Arc::new(context),
            store: Arc::new(store),
            options,
            cancel: None,
        }
    }

    /// Stop starting new versions and attempts once `cancel` reads `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn options(&self) -> &MatrixOptions {
        &self.options
    }

    /// Ensure every version in `versions` has an artifact of kind `A`.
    ///
    /// Individual version failures end up in the report. An error means
    /// the run itself broke (a worker panicked or the state machine was
    /// driven illegally).
    pub async fn run<A: Artifact>(&self, versions: &[String]) -> Result<MatrixReport, MatrixError> {
        let mut seen = HashSet::new();
        let queue: VecDeque<String> = versions
            .iter()
            .filter(|v| seen.insert(v.as_str()))
            .cloned()
            .collect();
        let total = queue.len();
        let workers = self.options.jobs.clamp(1, total.max(1));
        let queue = Arc::new(Mutex::new(queue));
        info!(kind = A::KIND, versions = total, workers, "matrix run starting");

        let mut tasks = JoinSet::new();
        for id in 0..workers {
            let worker = Worker {
                id,
                context: self.context.clone(),
                store: self.store.clone(),
                options: self.options,
                cancel: self.cancel.clone(),
                queue: queue.clone(),
            };
            tasks.spawn(worker.run::<A>());
        }

        let mut runs = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            runs.extend(joined.map_err(|e| MatrixError::Worker(e.to_string()))??);
        }
        let cancelled: Vec<String> = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let report = MatrixReport::build(runs, cancelled);
        info!(
            succeeded = report.succeeded.len(),
            cached = report.cached.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            "matrix run finished"
        );
        Ok(report)
    }
}

enum AttemptError {
    /// The attempt failed; the version may be retried.
    Failed(String),
    Machine(MatrixError),
}

impl From<MatrixError> for AttemptError {
    fn from(e: MatrixError) -> Self {
        AttemptError::Machine(e)
    }
}

struct Worker<C> {
    id: usize,
    context: Arc<C>,
    store: Arc<ArtifactStore>,
    options: MatrixOptions,
    cancel: Option<watch::Receiver<bool>>,
    queue: Arc<Mutex<VecDeque<String>>>,
}

impl<C: ExecutionContext> Worker<C> {
    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn next(&self) -> Option<String> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    async fn run<A: Artifact>(self) -> Result<Vec<VersionRun>, MatrixError> {
        let mut done = Vec::new();
        loop {
            if self.cancelled() {
                debug!(worker = self.id, "cancelled; not starting more versions");
                break;
            }
            let Some(version) = self.next() else { break };
            let span = info_span!("version", %version, worker = self.id);
            done.push(self.process::<A>(version).instrument(span).await?);
        }
        Ok(done)
    }

    async fn process<A: Artifact>(&self, version: String) -> Result<VersionRun, MatrixError> {
        let mut run = VersionRun::new(version.clone());
        if let Err(e) = check_version(&version) {
            warn!(error = %e, "not attempting version");
            run.last_error = Some(e.to_string());
            run.advance(VersionState::Failed)?;
            return Ok(run);
        }
        match self.store.load::<A>(&version) {
            Ok(Some(_)) => {
                run.advance(VersionState::Done { cached: true })?;
                info!("cached artifact found");
                return Ok(run);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cache unreadable; recomputing"),
        }

        loop {
            let attempt = run.attempts + 1;
            if attempt > 1 {
                if self.cancelled() {
                    let last = run.last_error.take().unwrap_or_default();
                    run.last_error = Some(format!(
                        "cancelled after {} attempt(s): {}",
                        run.attempts, last
                    ));
                    run.advance(VersionState::Failed)?;
                    return Ok(run);
                }
                sleep(delay_before(attempt, self.options.backoff)).await;
            }
            run.advance(VersionState::Provisioning)?;
            info!(attempt, "provisioning");

            match self.attempt::<A>(&mut run).await {
                Ok(()) => {
                    run.advance(VersionState::Done { cached: false })?;
                    info!(attempts = run.attempts, "artifact persisted");
                    return Ok(run);
                }
                Err(AttemptError::Machine(e)) => return Err(e),
                Err(AttemptError::Failed(message)) => {
                    run.last_error = Some(message.clone());
                    if run.attempts >= self.options.retries {
                        warn!(attempts = run.attempts, error = %message, "version failed");
                        run.advance(VersionState::Failed)?;
                        return Ok(run);
                    }
                    warn!(attempt, error = %message, "attempt failed; retrying");
                    run.advance(VersionState::Retry)?;
                }
            }
        }
    }

    async fn attempt<A: Artifact>(&self, run: &mut VersionRun) -> Result<(), AttemptError> {
        let version = run.version.clone();
        let limit = self.options.provision_timeout;
        let handle = match timeout(limit, self.context.provision(&version)).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(AttemptError::Failed(e.to_string())),
            Err(_) => {
                return Err(AttemptError::Failed(
                    ContextError::Timeout {
                        version,
                        stage: "provisioning",
                        limit,
                    }
                    .to_string(),
                ))
            }
        };

        run.advance(VersionState::Running)?;
        let limit = self.options.run_timeout;
        let output = timeout(limit, self.context.run(&handle, A::KIND)).await;
        self.context.release(handle).await;
        let output = match output {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(AttemptError::Failed(e.to_string())),
            Err(_) => {
                return Err(AttemptError::Failed(
                    ContextError::Timeout {
                        version,
                        stage: "run",
                        limit,
                    }
                    .to_string(),
                ))
            }
        };

        run.advance(VersionState::Persisting)?;
        let artifact = A::parse_for(&output, &version).map_err(|e| {
            AttemptError::Failed(format!(
                "output is not a well-formed {} document for {}: {}",
                A::KIND,
                version,
                e
            ))
        })?;
        self.store
            .save(&artifact)
            .map_err(|e| AttemptError::Failed(e.to_string()))?;
        Ok(())
    }
}
