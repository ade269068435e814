//! Documents the matrix orchestrator persists, one per version.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::graph::TypeGraph;
use crate::snapshot::VersionSnapshot;
use crate::InterchangeError;

/// A per-version document that can be cached on disk.
pub trait Artifact: Serialize + DeserializeOwned + Send + 'static {
    /// Directory name the artifact kind is stored under.
    const KIND: &'static str;

    fn version(&self) -> &str;

    /// Structural invariants beyond what deserialization enforces.
    fn validate(&self) -> Result<(), InterchangeError>;

    /// Parse a document and check that it is well-formed for `expected_version`.
    fn parse_for(text: &str, expected_version: &str) -> Result<Self, InterchangeError> {
        let artifact: Self =
            serde_json::from_str(text).map_err(|e| InterchangeError::Malformed(e.to_string()))?;
        if artifact.version() != expected_version {
            return Err(InterchangeError::VersionMismatch {
                expected: expected_version.to_string(),
                found: artifact.version().to_string(),
            });
        }
        artifact.validate()?;
        Ok(artifact)
    }
}

impl Artifact for VersionSnapshot {
    const KIND: &'static str = "purity";

    fn version(&self) -> &str {
        &self.version
    }

    fn validate(&self) -> Result<(), InterchangeError> {
        VersionSnapshot::validate(self)
    }
}

impl Artifact for TypeGraph {
    const KIND: &'static str = "methods";

    fn version(&self) -> &str {
        &self.version
    }

    fn validate(&self) -> Result<(), InterchangeError> {
        TypeGraph::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn parse_for_rejects_other_version() {
        let snapshot = VersionSnapshot::new("v1.22.0", BTreeMap::new());
        let text = serde_json::to_string(&snapshot).unwrap();
        let err = VersionSnapshot::parse_for(&text, "v1.23.0").unwrap_err();
        assert!(matches!(err, InterchangeError::VersionMismatch { .. }));
    }

    #[test]
    fn parse_for_rejects_truncated_document() {
        let err = VersionSnapshot::parse_for("{\"version\": \"v1.22.0\", \"meth", "v1.22.0")
            .unwrap_err();
        assert!(matches!(err, InterchangeError::Malformed(_)));
    }

    #[test]
    fn parse_for_accepts_well_formed_document() {
        let snapshot = VersionSnapshot::new("v1.22.0", BTreeMap::new());
        let text = serde_json::to_string_pretty(&snapshot).unwrap();
        let parsed = VersionSnapshot::parse_for(&text, "v1.22.0").unwrap();
        assert_eq!(parsed, snapshot);
    }
}
