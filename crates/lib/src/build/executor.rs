//! Build executors.
//!
//! [`ShellExecutor`] runs one configured command per build through a shell,
//! streaming stdout and stderr into the attempt's log as lines arrive.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::log::{LogError, LogWriter};
use crate::types::Package;

/// Name of the package being built.
pub const PACKAGE_ENV: &str = "PKGREPO_PACKAGE";
pub const PACKAGE_ID_ENV: &str = "PKGREPO_PACKAGE_ID";
/// Name of the repo owning the package.
pub const REPO_ENV: &str = "PKGREPO_REPO";

/// Everything an executor gets to know about one attempt.
#[derive(Debug, Clone)]
pub struct BuildJob {
  pub package: Package,
  pub repo_name: String,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
  #[error("command failed with exit code {code:?}: {cmd}")]
  CommandFailed { cmd: String, code: Option<i32> },

  #[error("failed to spawn build command: {0}")]
  Spawn(#[source] io::Error),

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  #[error("log error: {0}")]
  Log(#[from] LogError),

  #[error("{0}")]
  Other(String),
}

#[async_trait]
pub trait BuildExecutor: Send + Sync {
  /// Run the build, writing its output to `log`. Returning `Ok` means the
  /// build itself succeeded; the scheduler still decides the final state.
  async fn execute(&self, job: &BuildJob, log: LogWriter) -> Result<(), ExecutorError>;
}

#[derive(Debug, Clone)]
pub struct ShellExecutor {
  command: String,
  shell: Option<String>,
  work_root: PathBuf,
}

impl ShellExecutor {
  pub fn new(command: impl Into<String>, work_root: impl Into<PathBuf>) -> Self {
    Self {
      command: command.into(),
      shell: None,
      work_root: work_root.into(),
    }
  }

  pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
    self.shell = Some(shell.into());
    self
  }

  pub fn from_config(config: &ServiceConfig) -> Self {
    let executor = Self::new(config.build_command.clone(), config.work_dir());
    match &config.shell {
      Some(shell) => executor.with_shell(shell.clone()),
      None => executor,
    }
  }

  pub fn work_root(&self) -> &Path {
    &self.work_root
  }
}

#[async_trait]
impl BuildExecutor for ShellExecutor {
  async fn execute(&self, job: &BuildJob, log: LogWriter) -> Result<(), ExecutorError> {
    let work_dir = self.work_root.join(job.package.id.to_string());
    tokio::fs::create_dir_all(&work_dir).await?;

    let (shell_cmd, shell_args) = get_shell(self.shell.as_deref());
    info!(package = %job.package.id, cmd = %self.command, "executing build command");

    let mut command = Command::new(&shell_cmd);
    command
      .args(&shell_args)
      .arg(&self.command)
      .current_dir(&work_dir)
      .env(PACKAGE_ENV, &job.package.name)
      .env(PACKAGE_ID_ENV, job.package.id.to_string())
      .env(REPO_ENV, &job.repo_name)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    debug!(shell = %shell_cmd, working_dir = ?work_dir, "spawning process");
    let mut child = command.spawn().map_err(ExecutorError::Spawn)?;

    // A stalled pump would leave the child blocked on a full pipe.
    let pumped = tokio::try_join!(pump(child.stdout.take(), &log), pump(child.stderr.take(), &log));
    if let Err(err) = pumped {
      warn!(package = %job.package.id, error = %err, "log capture failed, killing build");
      if let Err(kill) = child.kill().await {
        debug!(error = %kill, "failed to kill build process");
      }
      return Err(err);
    }
    let status = child.wait().await?;

    if !status.success() {
      return Err(ExecutorError::CommandFailed {
        cmd: self.command.clone(),
        code: status.code(),
      });
    }

    Ok(())
  }
}

/// Copy a child stream into the log one line at a time, bytes untouched.
async fn pump<R>(stream: Option<R>, log: &LogWriter) -> Result<(), ExecutorError>
where
  R: AsyncRead + Unpin,
{
  let Some(stream) = stream else {
    return Ok(());
  };

  let mut reader = BufReader::new(stream);
  loop {
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line).await? == 0 {
      return Ok(());
    }
    log.write(line)?;
  }
}

/// Shell and arguments used to run the build command.
///
/// Without an override this is `/bin/sh -c` (Unix) or PowerShell (Windows),
/// never `$SHELL`, so user profiles do not leak into builds.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
