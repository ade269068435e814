//! purity-interchange: shared JSON types for the purity survey.
//!
//! Every other crate in the workspace exchanges data through the types
//! defined here: the enumerator produces a [`TypeGraph`], the oracle
//! produces [`MethodClassification`]s collected into a
//! [`VersionSnapshot`], the matrix orchestrator persists both as
//! [`Artifact`]s, and the aggregator reads snapshots back.
//!
//! Field absence on the wire is meaningful: a probe that was not
//! applicable or not conclusive leaves its field out entirely, and
//! consumers must never read a missing field as `false`.

pub mod artifact;
pub mod classification;
pub mod graph;
pub mod snapshot;
pub mod version;

pub use artifact::Artifact;
pub use classification::{Anomaly, ImpureMode, MethodClassification};
pub use graph::{
    MethodDescriptor, PollutionPath, PollutionReason, ReflectedType, SkippedNode, TypeGraph,
};
pub use snapshot::{Summary, VersionSnapshot};
pub use version::{sort_versions, VersionKey};

/// Errors raised when an interchange document is structurally valid JSON
/// but violates an invariant of the data model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterchangeError {
    /// The document describes a different version than the one requested.
    #[error("version mismatch: expected '{expected}', found '{found}'")]
    VersionMismatch { expected: String, found: String },

    /// A method classification breaks a field invariant.
    #[error("method '{method}': {message}")]
    InvalidClassification { method: String, message: String },

    /// A type graph breaks a structural invariant.
    #[error("invalid type graph: {0}")]
    InvalidGraph(String),

    /// The document could not be parsed at all.
    #[error("malformed document: {0}")]
    Malformed(String),
}
