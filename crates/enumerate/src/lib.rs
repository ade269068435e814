//! purity-enumerate: reflective type-graph walk.
//!
//! Starting from one or more root types, [`TypeEnumerator`] visits every
//! type reachable through method signatures, records each type's exported
//! methods, and flags the methods that can propagate or mutate the handle
//! type ("pollution paths"). The walk is a visited-set guarded worklist, so
//! cyclic surfaces (a handle whose statement points back at the handle)
//! terminate.

pub mod filter;
pub mod json;
pub mod surface;
pub mod walk;

pub use filter::{DomainFilter, TypeClass};
pub use json::JsonSurface;
pub use surface::{RawMethod, RawType, SurfaceError, TypeRef, TypeSurface};
pub use walk::TypeEnumerator;

use purity_interchange::{InterchangeError, TypeGraph};

#[derive(Debug, thiserror::Error)]
pub enum EnumerateError {
    #[error("no root types given")]
    NoRoots,

    #[error("enumerated graph is inconsistent: {0}")]
    Graph(InterchangeError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// Enumerate `roots` on `surface` in one call.
pub fn enumerate<S: TypeSurface>(
    surface: S,
    filter: DomainFilter,
    version: &str,
    roots: &[&str],
) -> Result<TypeGraph, EnumerateError> {
    TypeEnumerator::new(surface, filter).enumerate(version, roots)
}
