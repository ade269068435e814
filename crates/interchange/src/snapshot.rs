//! One version's complete survey.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classification::MethodClassification;
use crate::InterchangeError;

/// Summary counts over the methods that exist in a version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_methods: usize,
    pub pure_methods: usize,
    pub impure_methods: usize,
    pub immutable_count: usize,
    pub mutable_count: usize,
    pub callback_immutable: usize,
    pub callback_mutable: usize,
    #[serde(default)]
    pub anomaly_count: usize,
}

impl Summary {
    pub fn from_methods(methods: &BTreeMap<String, MethodClassification>) -> Self {
        let mut summary = Summary::default();
        for m in methods.values().filter(|m| m.exists) {
            summary.total_methods += 1;
            match m.pure {
                Some(true) => summary.pure_methods += 1,
                Some(false) => summary.impure_methods += 1,
                None => {}
            }
            match m.immutable_return {
                Some(true) => summary.immutable_count += 1,
                Some(false) => summary.mutable_count += 1,
                None => {}
            }
            match m.callback_arg_immutable {
                Some(true) => summary.callback_immutable += 1,
                Some(false) => summary.callback_mutable += 1,
                None => {}
            }
            summary.anomaly_count += m.anomalies.len();
        }
        summary
    }
}

/// The persisted unit of caching: every classification for one version.
///
/// Snapshots are never patched in place; re-running a version replaces
/// the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub version: String,
    pub methods: BTreeMap<String, MethodClassification>,
    pub summary: Summary,
}

impl VersionSnapshot {
    /// Build a snapshot and derive its summary.
    pub fn new(
        version: impl Into<String>,
        methods: BTreeMap<String, MethodClassification>,
    ) -> Self {
        let summary = Summary::from_methods(&methods);
        VersionSnapshot {
            version: version.into(),
            methods,
            summary,
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodClassification> {
        self.methods.get(name)
    }

    /// Check every classification and that the summary matches the methods.
    pub fn validate(&self) -> Result<(), InterchangeError> {
        for (name, m) in &self.methods {
            if name != &m.name {
                return Err(InterchangeError::InvalidClassification {
                    method: name.clone(),
                    message: format!("keyed under '{}' but named '{}'", name, m.name),
                });
            }
            m.validate()?;
        }
        if Summary::from_methods(&self.methods) != self.summary {
            return Err(InterchangeError::Malformed(format!(
                "summary of {} does not match its methods",
                self.version
            )));
        }
        Ok(())
    }
}
