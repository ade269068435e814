mod commands;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "PURITY_LOG";

/// Output format for command results on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Artifact kind produced per version by the matrix command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ArtifactKind {
    /// Purity snapshots
    Purity,
    /// Type graphs
    Methods,
}

/// Behavioral purity survey of fluent-API handles across library versions.
#[derive(Parser)]
#[command(
    name = "purity",
    version,
    about = "Behavioral purity survey of fluent-API handles across library versions"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "json", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enumerate a type graph at one version, from the reference builder
    /// or from a dumped surface document
    Enumerate {
        /// Version identifier, e.g. v1.25.0
        version: String,
        /// Write the graph to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Walk this JSON surface document instead of the reference builder
        #[arg(long)]
        surface: Option<PathBuf>,
        /// Root handle type of the surface document
        #[arg(long, requires = "surface")]
        handle: Option<String>,
        /// Comma-separated name fragments marking domain types
        #[arg(long, value_delimiter = ',', requires = "surface")]
        domain: Vec<String>,
    },

    /// Survey the reference builder at one version
    Survey {
        /// Version identifier, e.g. v1.25.0
        version: String,
        /// Write the snapshot to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run the survey across many versions with caching and retries
    Matrix {
        /// Path to a purity.toml (default: ./purity.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Comma-separated versions; overrides the config file
        #[arg(long, value_delimiter = ',')]
        versions: Vec<String>,
        /// Versions run concurrently
        #[arg(long)]
        jobs: Option<usize>,
        /// Attempts per version
        #[arg(long)]
        retries: Option<u32>,
        /// Artifact store directory
        #[arg(long)]
        store: Option<PathBuf>,
        /// Provisioning timeout in seconds
        #[arg(long)]
        provision_timeout: Option<u64>,
        /// Run timeout in seconds
        #[arg(long)]
        run_timeout: Option<u64>,
        /// Artifact to produce per version
        #[arg(long, default_value = "purity", value_enum)]
        kind: ArtifactKind,
    },

    /// Build version matrices and change records from cached snapshots
    Aggregate {
        /// Artifact store directory
        #[arg(long, default_value = "purity-store")]
        store: PathBuf,
        /// Comma-separated versions to include; missing ones are reported as gaps
        #[arg(long, value_delimiter = ',')]
        versions: Vec<String>,
        /// Write the report to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn init_logging(quiet: bool) {
    let default = if quiet { "error" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    match cli.command {
        Commands::Enumerate {
            version,
            out,
            surface,
            handle,
            domain,
        } => {
            let source = match surface {
                Some(path) => commands::survey::GraphSource::Document {
                    path,
                    handle,
                    domain,
                },
                None => commands::survey::GraphSource::Reference,
            };
            commands::survey::cmd_enumerate(&version, source, out.as_deref(), cli.output, cli.quiet);
        }
        Commands::Survey { version, out } => {
            commands::survey::cmd_survey(&version, out.as_deref(), cli.output, cli.quiet);
        }
        Commands::Matrix {
            config,
            versions,
            jobs,
            retries,
            store,
            provision_timeout,
            run_timeout,
            kind,
        } => {
            commands::matrix::cmd_matrix(commands::matrix::MatrixArgs {
                config: config.as_deref(),
                versions,
                jobs,
                retries,
                store,
                provision_timeout,
                run_timeout,
                kind,
                output: cli.output,
                quiet: cli.quiet,
            });
        }
        Commands::Aggregate {
            store,
            versions,
            out,
        } => {
            commands::aggregate::cmd_aggregate(
                &store,
                &versions,
                out.as_deref(),
                cli.output,
                cli.quiet,
            );
        }
    }
}

/// Print `text` to stdout, or write it to `out`.
pub(crate) fn emit(text: &str, out: Option<&Path>, output: OutputFormat, quiet: bool) {
    match out {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                let msg = format!("error writing '{}': {}", path.display(), e);
                report_error(&msg, output, quiet);
                process::exit(1);
            }
        }
        None => print!("{}", text),
    }
}

/// Pretty JSON with a trailing newline, or exit 1.
pub(crate) fn to_json<T: serde::Serialize>(value: &T, output: OutputFormat, quiet: bool) -> String {
    match serde_json::to_string_pretty(value) {
        Ok(mut text) => {
            text.push('\n');
            text
        }
        Err(e) => {
            report_error(&format!("serialization error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

/// Report an error message to stderr in the appropriate format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
