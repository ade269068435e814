//! Observation side of the probes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lowercase and collapse every whitespace run to a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Records the externally observable effects (rendered statements) of a
/// live target instance.
pub trait EffectRecorder {
    fn reset(&self);

    fn recorded_effects(&self) -> Vec<String>;

    /// True if any recorded effect contains `needle`, ignoring case and
    /// whitespace layout.
    fn contains_normalized(&self, needle: &str) -> bool {
        let needle = normalize(needle);
        self.recorded_effects()
            .iter()
            .any(|effect| normalize(effect).contains(&needle))
    }

    /// Number of non-overlapping occurrences of `needle` across all
    /// recorded effects.
    fn count_normalized(&self, needle: &str) -> usize {
        let needle = normalize(needle);
        if needle.is_empty() {
            return 0;
        }
        self.recorded_effects()
            .iter()
            .map(|effect| normalize(effect).matches(needle.as_str()).count())
            .sum()
    }
}

/// An in-memory recorder. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CapturingRecorder {
    effects: Arc<Mutex<Vec<String>>>,
}

impl CapturingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, effect: impl Into<String>) {
        self.lock().push(effect.into());
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.effects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EffectRecorder for CapturingRecorder {
    fn reset(&self) {
        self.lock().clear();
    }

    fn recorded_effects(&self) -> Vec<String> {
        self.lock().clone()
    }
}
