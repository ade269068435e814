//! Subprocess execution context.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::context::{ContextError, ExecutionContext};
use crate::store::check_version;

/// Environment variable carrying the version to the spawned program.
pub const VERSION_ENV: &str = "PURITY_TARGET_VERSION";

/// How to provision and run one version as child processes.
///
/// `args` and `provision` may contain `{version}` and `{program}`
/// placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Command run once in the version's directory before the first run.
    pub provision: Option<Vec<String>>,
    pub work_dir: PathBuf,
}

/// A provisioned version directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub version: String,
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProcessContext {
    spec: ProcessSpec,
}

fn substitute(arg: &str, version: &str, program: &str) -> String {
    arg.replace("{version}", version)
        .replace("{program}", program)
}

fn stderr_tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "no output on stderr".to_string()
    } else {
        trimmed.to_string()
    }
}

impl ProcessContext {
    pub fn new(spec: ProcessSpec) -> Self {
        ProcessContext { spec }
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// Directory a version is provisioned into. Only meaningful for
    /// identifiers that pass [`check_version`].
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.spec.work_dir.join(version)
    }

    async fn provision_command(
        &self,
        command: &[String],
        version: &str,
        dir: &Path,
    ) -> Result<(), ContextError> {
        let fail = |message: String| ContextError::Provisioning {
            version: version.to_string(),
            message,
        };
        let Some((program, args)) = command.split_first() else {
            return Err(fail("empty provisioning command".to_string()));
        };
        let output = Command::new(substitute(program, version, ""))
            .args(args.iter().map(|a| substitute(a, version, "")))
            .current_dir(dir)
            .env(VERSION_ENV, version)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| fail(format!("failed to spawn {}: {}", program, e)))?;
        if !output.status.success() {
            return Err(fail(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr_tail(&output.stderr)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionContext for ProcessContext {
    type Handle = ProcessHandle;

    async fn provision(&self, version: &str) -> Result<ProcessHandle, ContextError> {
        check_version(version).map_err(|e| ContextError::Provisioning {
            version: version.to_string(),
            message: e.to_string(),
        })?;
        let dir = self.version_dir(version);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ContextError::Provisioning {
                version: version.to_string(),
                message: format!("cannot create {}: {}", dir.display(), e),
            })?;
        if let Some(command) = &self.spec.provision {
            self.provision_command(command, version, &dir).await?;
        }
        debug!(version, dir = %dir.display(), "provisioned");
        Ok(ProcessHandle {
            version: version.to_string(),
            dir,
        })
    }

    async fn run(&self, handle: &ProcessHandle, program: &str) -> Result<String, ContextError> {
        let runtime = |message: String| ContextError::Runtime {
            version: handle.version.clone(),
            program: program.to_string(),
            message,
        };
        let output = Command::new(&self.spec.program)
            .args(
                self.spec
                    .args
                    .iter()
                    .map(|a| substitute(a, &handle.version, program)),
            )
            .current_dir(&handle.dir)
            .env(VERSION_ENV, &handle.version)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| runtime(format!("failed to spawn {}: {}", self.spec.program, e)))?;
        if !output.status.success() {
            return Err(runtime(format!(
                "exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }
        String::from_utf8(output.stdout).map_err(|e| runtime(format!("output is not UTF-8: {}", e)))
    }
}
