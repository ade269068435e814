//! Method x version matrices.

use std::collections::{BTreeMap, BTreeSet};

use purity_interchange::VersionSnapshot;
use serde::{Deserialize, Serialize};

use crate::dimension::{Cell, Dimension};

/// One dimension's values. Each row holds one cell per report version, in
/// report version order; `null` marks a probe with no verdict. A method
/// missing from a snapshot reads as `exists = false` and `null` elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionMatrix {
    pub dimension: Dimension,
    pub rows: BTreeMap<String, Vec<Option<Cell>>>,
}

impl DimensionMatrix {
    pub fn cell(&self, method: &str, column: usize) -> Option<Cell> {
        self.rows.get(method).and_then(|row| row.get(column).copied().flatten())
    }
}

/// Every method name seen in any snapshot, sorted.
pub fn method_names(snapshots: &[VersionSnapshot]) -> BTreeSet<String> {
    snapshots
        .iter()
        .flat_map(|s| s.methods.keys().cloned())
        .collect()
}

/// The value of `name` in `snapshot` for `dimension`.
///
/// Snapshots only list the methods they know about, so a method seen in
/// another version but missing here did not exist here.
pub fn cell_for(snapshot: &VersionSnapshot, name: &str, dimension: Dimension) -> Option<Cell> {
    match snapshot.method(name) {
        Some(m) => dimension.value(m),
        None if dimension == Dimension::Exists => Some(Cell::Bool(false)),
        None => None,
    }
}

/// Build one matrix per dimension over already-sorted snapshots.
pub fn build_matrices(snapshots: &[VersionSnapshot]) -> Vec<DimensionMatrix> {
    let methods = method_names(snapshots);
    Dimension::ALL
        .into_iter()
        .map(|dimension| {
            let rows = methods
                .iter()
                .map(|name| {
                    let row = snapshots
                        .iter()
                        .map(|s| cell_for(s, name, dimension))
                        .collect();
                    (name.clone(), row)
                })
                .collect();
            DimensionMatrix { dimension, rows }
        })
        .collect()
}
