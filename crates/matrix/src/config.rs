//! `purity.toml`: matrix run configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::process::ProcessSpec;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which execution context runs each version.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ContextConfig {
    #[default]
    InProcess,
    Process {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        provision: Option<Vec<String>>,
        #[serde(default = "default_work_dir")]
        work_dir: PathBuf,
    },
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("purity-work")
}

impl ContextConfig {
    pub fn process_spec(&self) -> Option<ProcessSpec> {
        match self {
            ContextConfig::InProcess => None,
            ContextConfig::Process {
                program,
                args,
                provision,
                work_dir,
            } => Some(ProcessSpec {
                program: program.clone(),
                args: args.clone(),
                provision: provision.clone(),
                work_dir: work_dir.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatrixConfig {
    pub versions: Vec<String>,
    pub jobs: usize,
    pub retries: u32,
    pub provision_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub store: PathBuf,
    pub backoff_ms: u64,
    pub context: ContextConfig,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        MatrixConfig {
            versions: Vec::new(),
            jobs: 4,
            retries: 3,
            provision_timeout_secs: 300,
            run_timeout_secs: 120,
            store: PathBuf::from("purity-store"),
            backoff_ms: 500,
            context: ContextConfig::InProcess,
        }
    }
}

impl MatrixConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: MatrixConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs == 0 {
            return Err(ConfigError::Invalid("jobs must be at least 1".to_string()));
        }
        if self.retries == 0 {
            return Err(ConfigError::Invalid("retries must be at least 1".to_string()));
        }
        if let ContextConfig::Process { program, .. } = &self.context {
            if program.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "context.program must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn options(&self) -> MatrixOptions {
        MatrixOptions {
            jobs: self.jobs,
            retries: self.retries,
            provision_timeout: Duration::from_secs(self.provision_timeout_secs),
            run_timeout: Duration::from_secs(self.run_timeout_secs),
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// Runtime knobs of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixOptions {
    pub jobs: usize,
    /// Attempts per version, including the first.
    pub retries: u32,
    pub provision_timeout: Duration,
    pub run_timeout: Duration,
    pub backoff: Duration,
}

impl Default for MatrixOptions {
    fn default() -> Self {
        MatrixConfig::default().options()
    }
}
