//! purity-oracle: black-box mutability probes.
//!
//! The oracle infers how a fluent, stateful API treats its handle purely
//! from observable effects. A [`Target`] exposes a live instance of the
//! surveyed library by method name, an [`EffectRecorder`] captures what it
//! executes, and the probes in [`probe`] compare recordings:
//!
//! - purity: does a discarded call leave a trace on the receiver?
//! - impure mode: do repeated calls accumulate or overwrite?
//! - immutable return: do two branches off a returned handle interfere?
//! - callback isolation: does the handle given to a callback carry state
//!   from earlier runs?
//! - finisher retention: does running a finisher strip the query?
//!
//! [`Oracle::survey`] runs them over every method of interest in a
//! [`purity_interchange::TypeGraph`] and produces a
//! [`purity_interchange::VersionSnapshot`].

pub mod anomaly;
pub mod catalog;
pub mod marker;
pub mod probe;
pub mod recorder;
pub mod survey;
pub mod target;

pub use catalog::{ArgShape, Catalog, Category, MethodPlan, Priority, ProbeCall};
pub use marker::{marker, Role};
pub use probe::Verdict;
pub use recorder::{normalize, CapturingRecorder, EffectRecorder};
pub use survey::{survey, Oracle};
pub use target::{Arg, Call, CallbackLog, Connection, Target};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The target reported an error for a call.
    #[error("target error: {0}")]
    Target(String),

    #[error("probe panicked: {0}")]
    Panicked(String),

    #[error("method '{0}' is not supported by the target")]
    Unsupported(String),

    /// The graph never reached the handle type, so there is nothing to probe.
    #[error("type graph has no entry for handle type '{0}'")]
    HandleNotEnumerated(String),
}
