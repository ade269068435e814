//! Aggregation over hand-built and surveyed snapshots.

use std::collections::BTreeMap;

use purity_aggregate::{aggregate, aggregate_store, AggregateError, Cell, Dimension};
use purity_interchange::{Anomaly, ImpureMode, MethodClassification, VersionSnapshot};
use purity_matrix::ArtifactStore;

fn classified(name: &str, pure: Option<bool>) -> MethodClassification {
    let mut m = MethodClassification::existing(name);
    m.pure = pure;
    if pure == Some(false) {
        m.impure_mode = Some(ImpureMode::Accumulate);
    }
    m
}

fn snapshot(version: &str, methods: Vec<MethodClassification>) -> VersionSnapshot {
    let methods: BTreeMap<String, MethodClassification> =
        methods.into_iter().map(|m| (m.name.clone(), m)).collect();
    VersionSnapshot::new(version, methods)
}

fn versions(list: &[&str]) -> Vec<String> {
    list.iter().map(|v| v.to_string()).collect()
}

#[test]
fn one_change_for_a_differing_adjacent_pair() {
    let report = aggregate(
        vec![
            snapshot("v1.1.0", vec![classified("Count", Some(true)), classified("Where", Some(false))]),
            snapshot("v1.0.0", vec![classified("Count", Some(false)), classified("Where", Some(false))]),
        ],
        &[],
    )
    .unwrap();

    assert_eq!(report.versions, vec!["v1.0.0", "v1.1.0"]);
    let pure_changes: Vec<_> = report
        .changes
        .iter()
        .filter(|c| c.dimension == Dimension::Pure)
        .collect();
    assert_eq!(pure_changes.len(), 1);
    let change = pure_changes[0];
    assert_eq!(change.method, "Count");
    assert_eq!(change.from_version, "v1.0.0");
    assert_eq!(change.to_version, "v1.1.0");
    assert_eq!(change.old, Cell::Bool(false));
    assert_eq!(change.new, Cell::Bool(true));
    assert_eq!(report.changes_for("Where").count(), 0);
}

#[test]
fn inconclusive_values_are_not_changes() {
    let report = aggregate(
        vec![
            snapshot("v1.0.0", vec![classified("Pluck", Some(false))]),
            snapshot("v1.1.0", vec![classified("Pluck", None)]),
        ],
        &[],
    )
    .unwrap();
    assert!(report.changes.is_empty());
    let pure = report.matrix(Dimension::Pure).unwrap();
    assert_eq!(pure.rows["Pluck"], vec![Some(Cell::Bool(false)), None]);
}

#[test]
fn gaps_are_skipped_not_diffed() {
    let report = aggregate(
        vec![
            snapshot("v1.0.0", vec![classified("Count", Some(false))]),
            snapshot("v1.2.0", vec![classified("Count", Some(false))]),
            snapshot("v9.9.9", vec![classified("Count", Some(true))]),
        ],
        &versions(&["v1.2.0", "v1.1.0", "v1.0.0"]),
    )
    .unwrap();
    assert_eq!(report.versions, vec!["v1.0.0", "v1.2.0"]);
    assert_eq!(report.gaps, vec!["v1.1.0"]);
    assert!(report.changes.is_empty());
    assert_eq!(report.summary.len(), 2);
}

#[test]
fn appearing_methods_change_existence() {
    let absent = MethodClassification::missing("InnerJoins");
    let report = aggregate(
        vec![
            snapshot("v1.24.0", vec![absent]),
            snapshot("v1.25.0", vec![classified("InnerJoins", Some(false))]),
        ],
        &[],
    )
    .unwrap();
    assert_eq!(report.changes.len(), 1);
    assert_eq!(report.changes[0].dimension, Dimension::Exists);
    assert_eq!(report.changes[0].new, Cell::Bool(true));
}

#[test]
fn unlisted_methods_read_as_absent() {
    let report = aggregate(
        vec![
            snapshot("v1.25.0", vec![classified("Where", Some(false))]),
            snapshot(
                "v1.26.0",
                vec![classified("Where", Some(false)), classified("MapColumns", Some(true))],
            ),
            snapshot("v1.27.0", vec![classified("Where", Some(false))]),
        ],
        &[],
    )
    .unwrap();

    let exists = report.matrix(Dimension::Exists).unwrap();
    assert_eq!(
        exists.rows["MapColumns"],
        vec![Some(Cell::Bool(false)), Some(Cell::Bool(true)), Some(Cell::Bool(false))]
    );
    let pure = report.matrix(Dimension::Pure).unwrap();
    assert_eq!(pure.rows["MapColumns"], vec![None, Some(Cell::Bool(true)), None]);

    let changes: Vec<_> = report
        .changes_for("MapColumns")
        .map(|c| (c.dimension, c.from_version.as_str(), c.old, c.new))
        .collect();
    assert_eq!(
        changes,
        vec![
            (Dimension::Exists, "v1.25.0", Cell::Bool(false), Cell::Bool(true)),
            (Dimension::Exists, "v1.26.0", Cell::Bool(true), Cell::Bool(false)),
        ]
    );
}

#[test]
fn anomalies_are_listed_per_version() {
    let mut scopes = MethodClassification::existing("Scopes");
    scopes.callback_arg_immutable = Some(true);
    scopes.callback_clone_depth = Some(0);
    scopes.anomalies = vec![Anomaly::CallbackSharesHandle];
    let report = aggregate(vec![snapshot("v1.0.0", vec![scopes])], &[]).unwrap();
    assert_eq!(report.anomalies.len(), 1);
    assert_eq!(report.anomalies[0].method, "Scopes");
    assert_eq!(report.anomalies[0].anomaly, Anomaly::CallbackSharesHandle);
    assert_eq!(report.summary[0].summary.anomaly_count, 1);
}

#[test]
fn duplicate_and_invalid_snapshots_are_rejected() {
    let err = aggregate(
        vec![snapshot("v1.0.0", vec![]), snapshot("v1.0.0", vec![])],
        &[],
    )
    .unwrap_err();
    assert!(matches!(err, AggregateError::DuplicateVersion(v) if v == "v1.0.0"));

    let mut bad = snapshot("v1.0.0", vec![classified("Where", Some(true))]);
    bad.methods.get_mut("Where").unwrap().impure_mode = Some(ImpureMode::Overwrite);
    let err = aggregate(vec![bad], &[]).unwrap_err();
    assert!(matches!(err, AggregateError::Invalid { .. }));
}

#[test]
fn output_is_deterministic() {
    let build = || {
        aggregate(
            vec![
                snapshot("v1.10.0", vec![classified("B", Some(true)), classified("A", Some(false))]),
                snapshot("v1.9.0", vec![classified("A", Some(true)), classified("B", Some(false))]),
            ],
            &[],
        )
        .unwrap()
        .to_json()
        .unwrap()
    };
    let first = build();
    assert_eq!(first, build());
    let report: serde_json::Value = serde_json::from_str(&first).unwrap();
    let changes = report["changes"].as_array().unwrap();
    let methods: Vec<&str> = changes.iter().map(|c| c["method"].as_str().unwrap()).collect();
    assert_eq!(methods[..2], ["A", "B"]);
    assert_eq!(changes[0]["dimension"], "pure");
    assert_eq!(report["versions"], serde_json::json!(["v1.9.0", "v1.10.0"]));
}

#[test]
fn surveyed_versions_show_map_columns_arriving() {
    let requested = versions(&["v1.25.0", "v1.26.0"]);
    let snapshots = requested
        .iter()
        .map(|v| purity_refdb::survey(v).unwrap())
        .collect();
    let report = aggregate(snapshots, &requested).unwrap();
    let arrival: Vec<_> = report
        .changes_for("MapColumns")
        .filter(|c| c.dimension == Dimension::Exists)
        .map(|c| (c.from_version.as_str(), c.old, c.new))
        .collect();
    assert_eq!(arrival, vec![("v1.25.0", Cell::Bool(false), Cell::Bool(true))]);
}

#[test]
fn surveyed_versions_show_the_count_fix() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let requested = versions(&["v1.25.5", "v1.25.6", "v1.25.10"]);
    for v in &requested {
        store.save(&purity_refdb::survey(v).unwrap()).unwrap();
    }

    let report = aggregate_store(&store, &requested).unwrap();
    assert_eq!(report.versions, requested);
    let retention: Vec<_> = report
        .changes_for("Count")
        .filter(|c| c.dimension == Dimension::FinisherPreservesState)
        .map(|c| (c.from_version.as_str(), c.to_version.as_str(), c.new))
        .collect();
    assert_eq!(
        retention,
        vec![
            ("v1.25.5", "v1.25.6", Cell::Bool(false)),
            ("v1.25.6", "v1.25.10", Cell::Bool(true)),
        ]
    );
}
