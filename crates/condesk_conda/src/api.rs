use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use condesk_task_queue::{TaskError, TaskQueue};
use condesk_version::CanonicalName;
use serde::Deserialize;
use tracing::instrument;

use crate::command;
use crate::environment::{self, EnvironmentRef};
use crate::error::{CondaError, EnvironmentError};

/// The serialized façade over the conda binary.
///
/// All invocations run through one [`TaskQueue`]; submitting is cheap and the
/// actual process starts only after every earlier invocation finished.
pub struct CondaApi {
    queue: TaskQueue,
    conda_exe: PathBuf,
}

/// One `pip list --format=json` row.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PipPackage {
    pub name: String,
    pub version: String,
}

impl CondaApi {
    /// Locate conda on the search path.
    pub fn discover() -> Result<Self, CondaError> {
        let conda_exe = which::which("conda").map_err(|_| CondaError::ExecutableNotFound)?;
        Ok(Self::with_executable(conda_exe))
    }

    /// Use a specific conda executable.
    pub fn with_executable(conda_exe: impl Into<PathBuf>) -> Self {
        Self {
            queue: TaskQueue::new("conda"),
            conda_exe: conda_exe.into(),
        }
    }

    /// The linked canonical names of an environment prefix. Reads the
    /// filesystem directly; no process is spawned.
    pub fn linked(&self, prefix: &Path) -> Result<BTreeSet<String>, EnvironmentError> {
        environment::linked(prefix)
    }

    pub async fn install(
        &self,
        env: &EnvironmentRef,
        specs: &[String],
        channels: &[String],
        token: Option<&str>,
    ) -> Result<serde_json::Value, CondaError> {
        let args = command::install(env, specs, channels, token);
        self.run_json("install", args).await
    }

    pub async fn remove(
        &self,
        env: &EnvironmentRef,
        specs: &[String],
    ) -> Result<serde_json::Value, CondaError> {
        let args = command::remove(env, specs)?;
        self.run_json("remove", args).await
    }

    pub async fn create(
        &self,
        env: &EnvironmentRef,
        specs: &[String],
        channels: &[String],
    ) -> Result<serde_json::Value, CondaError> {
        let args = command::create(env, specs, channels)?;
        self.run_json("create", args).await
    }

    pub async fn clone_env(
        &self,
        env: &EnvironmentRef,
        source: &str,
    ) -> Result<serde_json::Value, CondaError> {
        let args = command::clone_env(env, source)?;
        self.run_json("create", args).await
    }

    /// Ask the solver what installing `specs` would change, without changing
    /// anything.
    pub async fn dependencies(
        &self,
        env: &EnvironmentRef,
        specs: &[String],
        channels: &[String],
    ) -> Result<serde_json::Value, CondaError> {
        let args = command::dependencies(env, specs, channels);
        self.run_json("install --dry-run", args).await
    }

    /// Canonical names (`{name}-{version}-pip`) of packages installed into
    /// `prefix` by pip but not linked by conda.
    #[instrument(skip(self))]
    pub async fn pip_list(&self, prefix: &Path) -> Result<Vec<String>, CondaError> {
        let linked = environment::linked(prefix)?;
        let python = python_executable(prefix);
        let args = ["-m", "pip", "list", "--format=json"]
            .map(str::to_string)
            .to_vec();

        let handle = self
            .queue
            .submit(run_process(python, "pip list".to_string(), args));
        let value = flatten(handle.finished().await, "pip list")?;
        let packages: Vec<PipPackage> =
            serde_json::from_value(value).map_err(|source| CondaError::Parse {
                operation: "pip list".to_string(),
                source: Arc::new(source),
            })?;
        Ok(pip_only_canonical_names(packages, &linked))
    }

    /// Uninstall pip-managed packages from `prefix`. Conda knows nothing
    /// about these, so the environment's own pip does the work.
    pub async fn pip_remove(&self, prefix: &Path, packages: &[String]) -> Result<(), CondaError> {
        let python = python_executable(prefix);
        let mut args = ["-m", "pip", "uninstall", "--yes"]
            .map(str::to_string)
            .to_vec();
        args.extend(packages.iter().cloned());

        let handle = self
            .queue
            .submit(run_unchecked(python, "pip uninstall".to_string(), args));
        flatten_unit(handle.finished().await, "pip uninstall")
    }

    /// Kill every outstanding and queued invocation.
    pub fn terminate_all(&self) {
        self.queue.terminate_all();
    }

    async fn run_json(
        &self,
        operation: &str,
        args: Vec<String>,
    ) -> Result<serde_json::Value, CondaError> {
        let handle = self.queue.submit(run_process(
            self.conda_exe.clone(),
            operation.to_string(),
            args,
        ));
        flatten(handle.finished().await, operation)
    }
}

/// Collapse queue-level failures into the conda error domain.
fn flatten(
    result: Result<Result<serde_json::Value, CondaError>, TaskError>,
    operation: &str,
) -> Result<serde_json::Value, CondaError> {
    match result {
        Ok(outcome) => outcome,
        Err(TaskError::Cancelled) => Err(CondaError::Cancelled),
        Err(TaskError::Panicked(message)) => Err(CondaError::Failed {
            operation: operation.to_string(),
            stderr: message,
        }),
    }
}

fn flatten_unit(
    result: Result<Result<(), CondaError>, TaskError>,
    operation: &str,
) -> Result<(), CondaError> {
    match result {
        Ok(outcome) => outcome,
        Err(TaskError::Cancelled) => Err(CondaError::Cancelled),
        Err(TaskError::Panicked(message)) => Err(CondaError::Failed {
            operation: operation.to_string(),
            stderr: message,
        }),
    }
}

/// Run a tool whose stdout is not JSON; only the exit status matters.
async fn run_unchecked(
    executable: PathBuf,
    operation: String,
    args: Vec<String>,
) -> Result<(), CondaError> {
    tracing::debug!(exe = %executable.display(), ?args, "running {operation}");
    let output = tokio::process::Command::new(&executable)
        .args(&args)
        .output()
        .await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(CondaError::Failed {
            operation,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

async fn run_process(
    executable: PathBuf,
    operation: String,
    args: Vec<String>,
) -> Result<serde_json::Value, CondaError> {
    tracing::debug!(exe = %executable.display(), ?args, "running {operation}");
    let output = tokio::process::Command::new(&executable)
        .args(&args)
        .output()
        .await?;
    parse_output(
        &operation,
        output.status.success(),
        &output.stdout,
        &output.stderr,
    )
}

/// Interpret a finished invocation.
///
/// Failure is a non-zero exit, a diagnostic stream with no JSON on stdout, or
/// a JSON document carrying an `error` field (conda reports solver failures
/// that way while still exiting zero in places).
fn parse_output(
    operation: &str,
    success: bool,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<serde_json::Value, CondaError> {
    let diagnostics = String::from_utf8_lossy(stderr).trim().to_string();
    if !success || (stdout.iter().all(u8::is_ascii_whitespace) && !diagnostics.is_empty()) {
        return Err(CondaError::Failed {
            operation: operation.to_string(),
            stderr: diagnostics,
        });
    }

    let value: serde_json::Value =
        serde_json::from_slice(stdout).map_err(|source| CondaError::Parse {
            operation: operation.to_string(),
            source: Arc::new(source),
        })?;

    if let Some(error) = value.get("error").and_then(serde_json::Value::as_str) {
        return Err(CondaError::Failed {
            operation: operation.to_string(),
            stderr: error.to_string(),
        });
    }
    Ok(value)
}

/// The environment's own python interpreter, used to run its pip.
fn python_executable(prefix: &Path) -> PathBuf {
    if cfg!(windows) {
        prefix.join("python.exe")
    } else {
        prefix.join("bin").join("python")
    }
}

/// `requests 2.9.0` → `requests-2.9.0-pip`, dropping anything conda already
/// links (those are conda's to manage, whatever pip thinks).
fn pip_only_canonical_names(packages: Vec<PipPackage>, linked: &BTreeSet<String>) -> Vec<String> {
    let linked_names: BTreeSet<String> = linked
        .iter()
        .filter_map(|canonical| canonical.parse::<CanonicalName>().ok())
        .map(|canonical| canonical.name().to_lowercase())
        .collect();

    packages
        .into_iter()
        .filter(|package| !linked_names.contains(&package.name.to_lowercase()))
        .map(|package| format!("{}-{}-pip", package.name, package.version))
        .collect()
}
