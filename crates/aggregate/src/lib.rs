//! purity-aggregate: cross-version view over survey snapshots.
//!
//! The aggregator reads [`VersionSnapshot`]s, orders them by version and
//! produces an [`AggregateReport`]: one method x version matrix per
//! [`Dimension`], the [`ChangeRecord`]s between adjacent available
//! versions, per-version summary rows and every recorded anomaly.
//! Requested versions without a snapshot are listed as gaps and skipped;
//! a gap is never a change.
//!
//! Aggregation is a pure function of its inputs: the same snapshots give
//! byte-identical JSON.

pub mod changes;
pub mod dimension;
pub mod matrix;
pub mod report;

pub use changes::{diff, ChangeRecord};
pub use dimension::{Cell, Dimension};
pub use matrix::{build_matrices, DimensionMatrix};
pub use report::{AggregateReport, AnomalyEntry, SummaryRow};

use std::collections::BTreeSet;

use purity_interchange::{sort_versions, InterchangeError, VersionKey, VersionSnapshot};
use purity_matrix::{ArtifactStore, StoreError};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("more than one snapshot for version {0}")]
    DuplicateVersion(String),

    #[error("snapshot {version} is invalid: {source}")]
    Invalid {
        version: String,
        #[source]
        source: InterchangeError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Aggregate `snapshots`.
///
/// With an empty `requested` list every snapshot is used. Otherwise only
/// requested versions are used, and requested versions with no snapshot
/// become gaps.
pub fn aggregate(
    snapshots: Vec<VersionSnapshot>,
    requested: &[String],
) -> Result<AggregateReport, AggregateError> {
    let mut seen = BTreeSet::new();
    for s in &snapshots {
        if !seen.insert(s.version.clone()) {
            return Err(AggregateError::DuplicateVersion(s.version.clone()));
        }
        s.validate().map_err(|source| AggregateError::Invalid {
            version: s.version.clone(),
            source,
        })?;
    }

    let (mut snapshots, mut gaps) = if requested.is_empty() {
        (snapshots, Vec::new())
    } else {
        let wanted: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
        let gaps: Vec<String> = wanted
            .iter()
            .filter(|v| !seen.contains(**v))
            .map(|v| v.to_string())
            .collect();
        let kept = snapshots
            .into_iter()
            .filter(|s| wanted.contains(s.version.as_str()))
            .collect();
        (kept, gaps)
    };
    snapshots.sort_by_cached_key(|s| VersionKey::parse(&s.version));
    sort_versions(&mut gaps);
    for gap in &gaps {
        debug!(version = %gap, "no snapshot; skipping");
    }

    let changes = diff(&snapshots);
    let report = AggregateReport {
        versions: snapshots.iter().map(|s| s.version.clone()).collect(),
        gaps,
        summary: report::summary_rows(&snapshots),
        matrices: build_matrices(&snapshots),
        changes,
        anomalies: report::anomalies(&snapshots),
    };
    info!(
        versions = report.versions.len(),
        gaps = report.gaps.len(),
        changes = report.changes.len(),
        anomalies = report.anomalies.len(),
        "aggregation complete"
    );
    Ok(report)
}

/// Aggregate the snapshots cached in `store`.
///
/// Unreadable or malformed cache files count as missing.
pub fn aggregate_store(
    store: &ArtifactStore,
    requested: &[String],
) -> Result<AggregateReport, AggregateError> {
    let snapshots = if requested.is_empty() {
        store.load_all::<VersionSnapshot>()?
    } else {
        let mut found = Vec::new();
        for version in requested.iter().collect::<BTreeSet<_>>() {
            if let Some(s) = store.load::<VersionSnapshot>(version)? {
                found.push(s);
            }
        }
        found
    };
    aggregate(snapshots, requested)
}
