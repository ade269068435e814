//! AggregateReport: the structured output handed to report renderers.

use purity_interchange::{Anomaly, Summary, VersionSnapshot};
use serde::{Deserialize, Serialize};

use crate::changes::ChangeRecord;
use crate::matrix::DimensionMatrix;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub version: String,
    #[serde(flatten)]
    pub summary: Summary,
}

/// An anomaly recorded on one method in one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyEntry {
    pub version: String,
    pub method: String,
    pub anomaly: Anomaly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    /// Versions with a snapshot, in version order. Matrix columns follow
    /// this order.
    pub versions: Vec<String>,
    /// Requested versions with no snapshot.
    pub gaps: Vec<String>,
    pub summary: Vec<SummaryRow>,
    pub matrices: Vec<DimensionMatrix>,
    pub changes: Vec<ChangeRecord>,
    pub anomalies: Vec<AnomalyEntry>,
}

impl AggregateReport {
    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    pub fn matrix(&self, dimension: crate::Dimension) -> Option<&DimensionMatrix> {
        self.matrices.iter().find(|m| m.dimension == dimension)
    }

    /// Column index of `version` in the matrices.
    pub fn column(&self, version: &str) -> Option<usize> {
        self.versions.iter().position(|v| v == version)
    }

    /// Changes touching `method`, in report order.
    pub fn changes_for<'a>(&'a self, method: &'a str) -> impl Iterator<Item = &'a ChangeRecord> {
        self.changes.iter().filter(move |c| c.method == method)
    }
}

pub(crate) fn summary_rows(snapshots: &[VersionSnapshot]) -> Vec<SummaryRow> {
    snapshots
        .iter()
        .map(|s| SummaryRow {
            version: s.version.clone(),
            summary: s.summary.clone(),
        })
        .collect()
}

pub(crate) fn anomalies(snapshots: &[VersionSnapshot]) -> Vec<AnomalyEntry> {
    let mut out = Vec::new();
    for s in snapshots {
        for m in s.methods.values() {
            for anomaly in &m.anomalies {
                out.push(AnomalyEntry {
                    version: s.version.clone(),
                    method: m.name.clone(),
                    anomaly: *anomaly,
                });
            }
        }
    }
    out
}
