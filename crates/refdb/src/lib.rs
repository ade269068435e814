//! purity-refdb: a reference fluent query builder.
//!
//! `refdb` is a small, in-memory query builder whose handle semantics
//! follow an isolation-depth model and vary by version: some methods only
//! exist from a given release on, and some releases carry isolation
//! defects. It serves two roles:
//!
//! - a live target for the oracle ([`RefTarget`]) and the surface for the
//!   enumerator ([`RefSurface`]), so the whole survey pipeline runs
//!   in-process for any version identifier;
//! - a fixture with known answers for testing the probes themselves.

pub mod db;
pub mod profile;
pub mod statement;
pub mod surface;
pub mod target;

pub use db::{Config, Db};
pub use profile::{VersionProfile, HANDLE_METHODS};
pub use statement::{bind, ScopeFn, Statement, Value};
pub use surface::{domain_filter, RefSurface, DOMAIN_MARKERS, HANDLE_TYPE};
pub use target::{dispatch, RefTarget, DEFAULT_BATCH};

use purity_enumerate::EnumerateError;
use purity_interchange::{TypeGraph, VersionSnapshot};
use purity_oracle::ProbeError;
use tracing::info_span;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefDbError {
    #[error("method '{method}' does not exist in version {version}")]
    Unsupported { method: String, version: String },

    #[error("invalid arguments for {method}: {message}")]
    BadArguments { method: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Enumerate(#[from] EnumerateError),

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Enumerate the builder's surface at `version`.
pub fn enumerate(version: &str) -> Result<TypeGraph, EnumerateError> {
    purity_enumerate::enumerate(RefSurface::new(version), domain_filter(), version, &[HANDLE_TYPE])
}

/// Enumerate and survey the builder at `version`.
pub fn survey(version: &str) -> Result<VersionSnapshot, PipelineError> {
    let _span = info_span!("refdb", %version).entered();
    let graph = enumerate(version)?;
    Ok(purity_oracle::survey(&RefTarget::new(version), &graph)?)
}
