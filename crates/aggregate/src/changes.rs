//! Change records between adjacent available versions.

use purity_interchange::VersionSnapshot;
use serde::{Deserialize, Serialize};

use crate::dimension::{Cell, Dimension};
use crate::matrix::{cell_for, method_names};

/// A dimension whose value differs between two adjacent snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub method: String,
    pub from_version: String,
    pub to_version: String,
    pub dimension: Dimension,
    pub old: Cell,
    pub new: Cell,
}

/// Diff every adjacent pair of sorted snapshots.
///
/// A record is emitted only when both sides carry a value and the values
/// differ. A method appearing or disappearing shows up in
/// [`Dimension::Exists`], including one that a snapshot does not list at
/// all; verdicts that become inconclusive do not produce
/// records. Output is ordered by version pair, then dimension, then method.
pub fn diff(snapshots: &[VersionSnapshot]) -> Vec<ChangeRecord> {
    let methods = method_names(snapshots);
    let mut changes = Vec::new();
    for pair in snapshots.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        for dimension in Dimension::ALL {
            for name in &methods {
                let old = cell_for(prev, name, dimension);
                let new = cell_for(next, name, dimension);
                if let (Some(old), Some(new)) = (old, new) {
                    if old != new {
                        changes.push(ChangeRecord {
                            method: name.clone(),
                            from_version: prev.version.clone(),
                            to_version: next.version.clone(),
                            dimension,
                            old,
                            new,
                        });
                    }
                }
            }
        }
    }
    changes
}
