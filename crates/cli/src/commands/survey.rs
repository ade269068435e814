use std::path::{Path, PathBuf};
use std::process;

use purity_enumerate::{DomainFilter, JsonSurface};
use purity_interchange::TypeGraph;
use purity_refdb::{DOMAIN_MARKERS, HANDLE_TYPE};

use crate::{emit, report_error, to_json, OutputFormat};

/// Where `enumerate` reads type signatures from.
pub(crate) enum GraphSource {
    Reference,
    /// A dumped surface; `handle` and `domain` default to the reference
    /// builder's.
    Document {
        path: PathBuf,
        handle: Option<String>,
        domain: Vec<String>,
    },
}

fn enumerate(version: &str, source: GraphSource) -> Result<TypeGraph, String> {
    let (path, handle, domain) = match source {
        GraphSource::Reference => {
            return purity_refdb::enumerate(version).map_err(|e| e.to_string())
        }
        GraphSource::Document {
            path,
            handle,
            domain,
        } => (path, handle, domain),
    };
    let surface = JsonSurface::from_path(&path).map_err(|e| e.to_string())?;
    if let Some(described) = surface.version() {
        if described != version {
            return Err(format!(
                "'{}' describes {}, not {}",
                path.display(),
                described,
                version
            ));
        }
    }
    let handle = handle.unwrap_or_else(|| HANDLE_TYPE.to_string());
    let filter = if domain.is_empty() {
        DomainFilter::new(handle.clone(), DOMAIN_MARKERS.iter().copied())
    } else {
        DomainFilter::new(handle.clone(), domain)
    };
    purity_enumerate::enumerate(surface, filter, version, &[handle.as_str()])
        .map_err(|e| e.to_string())
}

pub(crate) fn cmd_enumerate(
    version: &str,
    source: GraphSource,
    out: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) {
    let graph = match enumerate(version, source) {
        Ok(g) => g,
        Err(e) => {
            report_error(&format!("enumeration error: {}", e), output, quiet);
            process::exit(1);
        }
    };
    emit(&to_json(&graph, output, quiet), out, output, quiet);
}

pub(crate) fn cmd_survey(version: &str, out: Option<&Path>, output: OutputFormat, quiet: bool) {
    let snapshot = match purity_refdb::survey(version) {
        Ok(s) => s,
        Err(e) => {
            report_error(&format!("survey error: {}", e), output, quiet);
            process::exit(1);
        }
    };
    if output == OutputFormat::Text && out.is_none() {
        if !quiet {
            let s = &snapshot.summary;
            println!("Survey of {}", snapshot.version);
            println!("  Methods:   {}", s.total_methods);
            println!("  Pure:      {} ({} impure)", s.pure_methods, s.impure_methods);
            println!("  Immutable: {} ({} mutable)", s.immutable_count, s.mutable_count);
            println!(
                "  Callbacks: {} immutable, {} mutable",
                s.callback_immutable, s.callback_mutable
            );
            println!("  Anomalies: {}", s.anomaly_count);
        }
        return;
    }
    emit(&to_json(&snapshot, output, quiet), out, output, quiet);
}
