use std::path::Path;
use std::process;

use purity_aggregate::AggregateReport;
use purity_matrix::ArtifactStore;

use crate::{emit, report_error, to_json, OutputFormat};

pub(crate) fn cmd_aggregate(
    store: &Path,
    versions: &[String],
    out: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) {
    let store = ArtifactStore::new(store);
    let report = match purity_aggregate::aggregate_store(&store, versions) {
        Ok(r) => r,
        Err(e) => {
            report_error(&format!("aggregation error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    if output == OutputFormat::Text && out.is_none() {
        if !quiet {
            print_changes(&report);
        }
        return;
    }
    emit(&to_json(&report, output, quiet), out, output, quiet);
}

fn print_changes(report: &AggregateReport) {
    println!("Versions: {}", report.versions.join(", "));
    if !report.gaps.is_empty() {
        println!("Gaps:     {}", report.gaps.join(", "));
    }
    println!();
    if report.changes.is_empty() {
        println!("No changes.");
    }
    for c in &report.changes {
        println!(
            "  {} -> {}  {}.{}: {} -> {}",
            c.from_version, c.to_version, c.method, c.dimension, c.old, c.new
        );
    }
    for a in &report.anomalies {
        println!("  ANOMALY {} {}: {}", a.version, a.method, a.anomaly);
    }
}
