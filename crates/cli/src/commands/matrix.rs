use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use purity_interchange::{TypeGraph, VersionSnapshot};
use purity_matrix::{
    ArtifactStore, ConfigError, ExecutionContext, InProcessContext, MatrixConfig, MatrixError,
    MatrixOptions, MatrixReport, Orchestrator, ProcessContext,
};
use tokio::sync::watch;
use tracing::warn;

use crate::{report_error, to_json, ArtifactKind, OutputFormat};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG: &str = "purity.toml";

pub(crate) struct MatrixArgs<'a> {
    pub config: Option<&'a Path>,
    pub versions: Vec<String>,
    pub jobs: Option<usize>,
    pub retries: Option<u32>,
    pub store: Option<PathBuf>,
    pub provision_timeout: Option<u64>,
    pub run_timeout: Option<u64>,
    pub kind: ArtifactKind,
    pub output: OutputFormat,
    pub quiet: bool,
}

fn load_config(args: &MatrixArgs<'_>) -> Result<MatrixConfig, ConfigError> {
    let mut config = match args.config {
        Some(path) => MatrixConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG).is_file() => MatrixConfig::load(Path::new(DEFAULT_CONFIG))?,
        None => MatrixConfig::default(),
    };
    if !args.versions.is_empty() {
        config.versions = args.versions.clone();
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if let Some(store) = &args.store {
        config.store = store.clone();
    }
    if let Some(secs) = args.provision_timeout {
        config.provision_timeout_secs = secs;
    }
    if let Some(secs) = args.run_timeout {
        config.run_timeout_secs = secs;
    }
    config.validate()?;
    Ok(config)
}

/// In-process producer: survey or enumerate the reference builder.
fn produce(version: &str, program: &str) -> Result<String, String> {
    match program {
        "purity" => {
            let snapshot = purity_refdb::survey(version).map_err(|e| e.to_string())?;
            serde_json::to_string(&snapshot).map_err(|e| e.to_string())
        }
        "methods" => {
            let graph = purity_refdb::enumerate(version).map_err(|e| e.to_string())?;
            serde_json::to_string(&graph).map_err(|e| e.to_string())
        }
        other => Err(format!("unknown program '{}'", other)),
    }
}

pub(crate) fn cmd_matrix(args: MatrixArgs<'_>) {
    let (output, quiet) = (args.output, args.quiet);
    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };
    if config.versions.is_empty() {
        report_error(
            "error: no versions given (use --versions or the `versions` key in purity.toml)",
            output,
            quiet,
        );
        process::exit(1);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };
    let report = match rt.block_on(run(&config, args.kind)) {
        Ok(r) => r,
        Err(e) => {
            report_error(&format!("matrix error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => print!("{}", to_json(&report, output, quiet)),
        OutputFormat::Text => {
            if !quiet {
                print_summary(&report);
            }
        }
    }
    if !report.is_complete() {
        let _ = std::io::stdout().flush();
        process::exit(1);
    }
}

async fn run(config: &MatrixConfig, kind: ArtifactKind) -> Result<MatrixReport, MatrixError> {
    let store = ArtifactStore::new(&config.store);
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; letting in-flight attempts finish");
            let _ = tx.send(true);
        }
    });

    let options = config.options();
    match config.context.process_spec() {
        Some(spec) => {
            run_with(ProcessContext::new(spec), store, options, rx, &config.versions, kind).await
        }
        None => {
            run_with(InProcessContext::new(produce), store, options, rx, &config.versions, kind)
                .await
        }
    }
}

async fn run_with<C: ExecutionContext>(
    context: C,
    store: ArtifactStore,
    options: MatrixOptions,
    cancel: watch::Receiver<bool>,
    versions: &[String],
    kind: ArtifactKind,
) -> Result<MatrixReport, MatrixError> {
    let orchestrator = Orchestrator::new(context, store, options).with_cancellation(cancel);
    match kind {
        ArtifactKind::Purity => orchestrator.run::<VersionSnapshot>(versions).await,
        ArtifactKind::Methods => orchestrator.run::<TypeGraph>(versions).await,
    }
}

fn print_summary(report: &MatrixReport) {
    println!("Matrix run");
    println!("==========");
    println!("  Succeeded: {}", report.succeeded.len());
    println!("  Cached:    {}", report.cached.len());
    println!("  Failed:    {}", report.failed.len());
    println!("  Cancelled: {}", report.cancelled.len());
    for failed in &report.failed {
        println!(
            "  FAILED {} after {} attempt(s): {}",
            failed.version, failed.attempts, failed.reason
        );
    }
    for version in &report.cancelled {
        println!("  CANCELLED {}", version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(versions: &[&str]) -> MatrixArgs<'a> {
        MatrixArgs {
            config: None,
            versions: versions.iter().map(|v| v.to_string()).collect(),
            jobs: Some(8),
            retries: None,
            store: Some(PathBuf::from("elsewhere")),
            provision_timeout: None,
            run_timeout: Some(5),
            kind: ArtifactKind::Purity,
            output: OutputFormat::Json,
            quiet: true,
        }
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purity.toml");
        std::fs::write(&path, "versions = [\"v1.0.0\"]\njobs = 2\nretries = 5\n").unwrap();
        let mut a = args(&["v2.0.0", "v2.1.0"]);
        a.config = Some(path.as_path());
        let config = load_config(&a).unwrap();
        assert_eq!(config.versions, vec!["v2.0.0", "v2.1.0"]);
        assert_eq!(config.jobs, 8);
        assert_eq!(config.retries, 5);
        assert_eq!(config.store, PathBuf::from("elsewhere"));
        assert_eq!(config.run_timeout_secs, 5);
    }

    #[test]
    fn zero_jobs_flag_is_rejected() {
        let mut a = args(&["v1.0.0"]);
        a.jobs = Some(0);
        assert!(matches!(load_config(&a), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let mut a = args(&["v1.0.0"]);
        a.config = Some(Path::new("/nonexistent/purity.toml"));
        assert!(matches!(load_config(&a), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn producer_emits_parseable_documents() {
        use purity_interchange::Artifact;
        let text = produce("v1.25.0", "purity").unwrap();
        assert!(VersionSnapshot::parse_for(&text, "v1.25.0").is_ok());
        let text = produce("v1.25.0", "methods").unwrap();
        assert!(TypeGraph::parse_for(&text, "v1.25.0").is_ok());
        assert!(produce("v1.25.0", "other").is_err());
    }
}
