//! CLI integration tests for the `purity` binary.
//!
//! Every test runs in its own temporary directory so that no stray
//! `purity.toml` or store is picked up.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn purity(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("purity");
    cmd.current_dir(dir.path());
    cmd.env_remove("PURITY_LOG");
    cmd
}

fn stdout_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("stdout should be JSON")
}

// ──────────────────────────────────────────────
// Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    let dir = TempDir::new().unwrap();
    purity(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Behavioral purity survey"));
}

#[test]
fn version_exits_0() {
    let dir = TempDir::new().unwrap();
    purity(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("purity"));
}

// ──────────────────────────────────────────────
// Single-version commands
// ──────────────────────────────────────────────

#[test]
fn enumerate_prints_type_graph() {
    let dir = TempDir::new().unwrap();
    let assert = purity(&dir)
        .args(["enumerate", "v1.25.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("*refdb.DB"));
    let graph = stdout_json(&assert.get_output().stdout);
    assert_eq!(graph["version"], "v1.25.0");
}

#[test]
fn enumerate_walks_a_surface_document() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("surface.json"),
        r#"{
  "version": "v1.25.0",
  "types": [
    { "name": "*refdb.DB", "methods": [
        { "name": "Statement",
          "returns": [{"kind": "named", "name": "*refdb.Statement"}] },
        { "name": "Transaction",
          "params": [{"kind": "func",
                      "params": [{"kind": "named", "name": "*refdb.Tx"}],
                      "returns": [{"kind": "named", "name": "error"}]}],
          "returns": [{"kind": "named", "name": "error"}] } ] },
    { "name": "*refdb.Statement" },
    { "name": "*refdb.Tx" }
  ]
}"#,
    )
    .unwrap();
    let assert = purity(&dir)
        .args(["enumerate", "v1.25.0", "--surface", "surface.json"])
        .assert()
        .success();
    let graph = stdout_json(&assert.get_output().stdout);
    let types: Vec<&str> = graph["types"]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(types, vec!["*refdb.DB", "*refdb.Statement", "*refdb.Tx"]);

    purity(&dir)
        .args(["enumerate", "v1.26.0", "--surface", "surface.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("describes v1.25.0"));
}

#[test]
fn survey_prints_snapshot() {
    let dir = TempDir::new().unwrap();
    let assert = purity(&dir).args(["survey", "v1.25.0"]).assert().success();
    let snapshot = stdout_json(&assert.get_output().stdout);
    assert_eq!(snapshot["methods"]["Where"]["pure"], false);
    assert_eq!(snapshot["methods"]["Where"]["impure_mode"], "accumulate");
    assert_eq!(snapshot["methods"]["Create"]["pure"], true);
}

#[test]
fn survey_omits_fields_without_verdict() {
    let dir = TempDir::new().unwrap();
    let assert = purity(&dir).args(["survey", "v1.20.0"]).assert().success();
    let snapshot = stdout_json(&assert.get_output().stdout);
    let inner = &snapshot["methods"]["InnerJoins"];
    assert_eq!(inner["exists"], false);
    assert!(inner.get("pure").is_none());
}

#[test]
fn survey_out_writes_file() {
    let dir = TempDir::new().unwrap();
    purity(&dir)
        .args(["survey", "v1.23.0", "--out", "snapshot.json"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    let text = fs::read_to_string(dir.path().join("snapshot.json")).unwrap();
    assert!(text.contains("\"version\": \"v1.23.0\""));
}

#[test]
fn survey_text_output_is_a_summary() {
    let dir = TempDir::new().unwrap();
    purity(&dir)
        .args(["--output", "text", "survey", "master"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Survey of master"))
        .stdout(predicate::str::contains("Anomalies: 2"));
}

#[test]
fn logs_go_to_stderr() {
    let dir = TempDir::new().unwrap();
    let assert = purity(&dir)
        .env("PURITY_LOG", "debug")
        .args(["survey", "v1.25.0"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty().not());
    stdout_json(&assert.get_output().stdout);
}

// ──────────────────────────────────────────────
// Matrix
// ──────────────────────────────────────────────

#[test]
fn matrix_persists_then_hits_cache() {
    let dir = TempDir::new().unwrap();
    let assert = purity(&dir)
        .args(["matrix", "--versions", "v1.25.0,v1.24.0", "--store", "store"])
        .assert()
        .success();
    let report = stdout_json(&assert.get_output().stdout);
    assert_eq!(report["succeeded"], serde_json::json!(["v1.24.0", "v1.25.0"]));
    assert!(dir.path().join("store/purity/v1.24.0.json").is_file());

    let assert = purity(&dir)
        .args(["matrix", "--versions", "v1.24.0,v1.25.0", "--store", "store"])
        .assert()
        .success();
    let report = stdout_json(&assert.get_output().stdout);
    assert_eq!(report["cached"], serde_json::json!(["v1.24.0", "v1.25.0"]));
    assert_eq!(report["succeeded"], serde_json::json!([]));
}

#[test]
fn matrix_methods_kind_stores_type_graphs() {
    let dir = TempDir::new().unwrap();
    purity(&dir)
        .args(["matrix", "--versions", "v1.22.0", "--store", "store", "--kind", "methods"])
        .assert()
        .success();
    assert!(dir.path().join("store/methods/v1.22.0.json").is_file());
}

#[test]
fn matrix_reads_config_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("purity.toml"),
        "versions = [\"v1.21.0\"]\nstore = \"from-config\"\njobs = 1\n",
    )
    .unwrap();
    purity(&dir).arg("matrix").assert().success();
    assert!(dir.path().join("from-config/purity/v1.21.0.json").is_file());
}

#[test]
fn matrix_without_versions_exits_1() {
    let dir = TempDir::new().unwrap();
    purity(&dir)
        .arg("matrix")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no versions"));
}

#[test]
fn matrix_rejects_unknown_config_keys() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("purity.toml"), "parallelism = 3\n").unwrap();
    purity(&dir)
        .args(["matrix", "--versions", "v1.0.0"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid configuration"));
}

#[cfg(unix)]
#[test]
fn matrix_reports_failing_process_context() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("purity.toml"),
        r#"
retries = 2
backoff_ms = 0

[context]
kind = "process"
program = "sh"
args = ["-c", "echo cannot install {version} >&2; exit 1"]
work_dir = "work"
"#,
    )
    .unwrap();
    let assert = purity(&dir)
        .args(["matrix", "--versions", "v9.9.9", "--store", "store"])
        .assert()
        .failure()
        .code(1);
    let report = stdout_json(&assert.get_output().stdout);
    assert_eq!(report["failed"][0]["version"], "v9.9.9");
    assert_eq!(report["failed"][0]["attempts"], 2);
    assert!(report["failed"][0]["reason"]
        .as_str()
        .unwrap()
        .contains("cannot install v9.9.9"));
    assert!(!dir.path().join("store/purity/v9.9.9.json").exists());
}

// ──────────────────────────────────────────────
// Aggregate
// ──────────────────────────────────────────────

#[test]
fn aggregate_reports_changes_and_gaps() {
    let dir = TempDir::new().unwrap();
    purity(&dir)
        .args(["matrix", "--versions", "v1.24.0,v1.25.0", "--store", "store"])
        .assert()
        .success();

    let assert = purity(&dir)
        .args([
            "aggregate",
            "--store",
            "store",
            "--versions",
            "v1.24.0,v1.24.5,v1.25.0",
        ])
        .assert()
        .success();
    let report = stdout_json(&assert.get_output().stdout);
    assert_eq!(report["versions"], serde_json::json!(["v1.24.0", "v1.25.0"]));
    assert_eq!(report["gaps"], serde_json::json!(["v1.24.5"]));
    let changes = report["changes"].as_array().unwrap();
    assert!(changes.iter().any(|c| c["method"] == "InnerJoins"
        && c["dimension"] == "exists"
        && c["old"] == false
        && c["new"] == true));
}

#[test]
fn aggregate_is_deterministic() {
    let dir = TempDir::new().unwrap();
    purity(&dir)
        .args(["matrix", "--versions", "v1.22.0,v1.23.2,master", "--store", "store"])
        .assert()
        .success();
    let first = purity(&dir)
        .args(["aggregate", "--store", "store"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let second = purity(&dir)
        .args(["aggregate", "--store", "store"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(first, second);
}

#[test]
fn aggregate_text_lists_changes() {
    let dir = TempDir::new().unwrap();
    purity(&dir)
        .args(["matrix", "--versions", "v1.23.1,v1.23.2", "--store", "store"])
        .assert()
        .success();
    purity(&dir)
        .args(["--output", "text", "aggregate", "--store", "store"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "v1.23.1 -> v1.23.2  Begin.return_clone_depth: 2 -> 1",
        ));
}
