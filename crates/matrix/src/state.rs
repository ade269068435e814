//! Per-version run state.
//!
//! ```text
//! Pending ──cache hit──────────────────────────────▶ Done(cached)
//!    │  └─unusable identifier─────────────────────────▶ Failed
//!    │
//!    ▼
//! Provisioning ──▶ Running ──▶ Persisting ──▶ Done
//!    │                │            │
//!    └───────┬────────┴────────────┘
//!            ▼
//!          Retry ──▶ Provisioning       (within the retry budget)
//!            │
//!            ▼
//!          Failed
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::MatrixError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionState {
    Pending,
    Provisioning,
    Running,
    Persisting,
    Retry,
    Done { cached: bool },
    Failed,
}

impl VersionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, VersionState::Done { .. } | VersionState::Failed)
    }

    /// The transition table.
    pub fn can_transition_to(self, next: VersionState) -> bool {
        use VersionState::*;
        match (self, next) {
            (Pending, Done { cached: true }) => true,
            (Pending, Provisioning | Failed) => true,
            (Provisioning, Running) => true,
            (Running, Persisting) => true,
            (Persisting, Done { cached: false }) => true,
            (Provisioning | Running | Persisting, Retry | Failed) => true,
            (Retry, Provisioning | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionState::Pending => write!(f, "pending"),
            VersionState::Provisioning => write!(f, "provisioning"),
            VersionState::Running => write!(f, "running"),
            VersionState::Persisting => write!(f, "persisting"),
            VersionState::Retry => write!(f, "retry"),
            VersionState::Done { cached: true } => write!(f, "done (cached)"),
            VersionState::Done { cached: false } => write!(f, "done"),
            VersionState::Failed => write!(f, "failed"),
        }
    }
}

/// One version's progress through the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRun {
    pub version: String,
    pub state: VersionState,
    /// Every state entered, starting with `Pending`.
    pub history: Vec<VersionState>,
    /// Attempts started so far.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl VersionRun {
    pub fn new(version: impl Into<String>) -> Self {
        VersionRun {
            version: version.into(),
            state: VersionState::Pending,
            history: vec![VersionState::Pending],
            attempts: 0,
            last_error: None,
        }
    }

    /// Move to `next`, rejecting transitions the table does not allow.
    pub fn advance(&mut self, next: VersionState) -> Result<(), MatrixError> {
        if !self.state.can_transition_to(next) {
            return Err(MatrixError::IllegalTransition {
                version: self.version.clone(),
                from: self.state,
                to: next,
            });
        }
        if next == VersionState::Provisioning {
            self.attempts += 1;
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VersionState::*;

    #[test]
    fn happy_path_records_history() {
        let mut run = VersionRun::new("v1.0.0");
        for s in [Provisioning, Running, Persisting, Done { cached: false }] {
            run.advance(s).unwrap();
        }
        assert_eq!(
            run.history,
            vec![Pending, Provisioning, Running, Persisting, Done { cached: false }]
        );
        assert_eq!(run.attempts, 1);
        assert!(run.state.is_terminal());
    }

    #[test]
    fn retry_returns_to_provisioning_and_counts_attempts() {
        let mut run = VersionRun::new("v1.0.0");
        run.advance(Provisioning).unwrap();
        run.advance(Retry).unwrap();
        run.advance(Provisioning).unwrap();
        run.advance(Running).unwrap();
        run.advance(Failed).unwrap();
        assert_eq!(run.attempts, 2);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut run = VersionRun::new("v1.0.0");
        let err = run.advance(Running).unwrap_err();
        assert!(matches!(err, MatrixError::IllegalTransition { from: Pending, to: Running, .. }));
        assert!(run.advance(Done { cached: false }).is_err());

        run.advance(Done { cached: true }).unwrap();
        assert!(run.advance(Provisioning).is_err());
        assert_eq!(run.history, vec![Pending, Done { cached: true }]);
    }

    #[test]
    fn pending_can_fail_without_an_attempt() {
        let mut run = VersionRun::new("../x");
        run.advance(Failed).unwrap();
        assert_eq!(run.attempts, 0);
        assert!(run.advance(Provisioning).is_err());
    }
}
