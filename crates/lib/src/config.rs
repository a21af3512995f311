//! Service configuration and data directory resolution.
//!
//! Everything the service persists lives under one data directory:
//!
//! ```text
//! {data_dir}/
//! ├── records.json      # FileStore
//! ├── records.lock      # RecordsLock, held per record mutation
//! ├── locks/<id>.lock   # BuildLock, held by the process running a build
//! ├── logs/<id>.log     # LogArchive, appended while the build runs
//! └── work/<id>/        # ShellExecutor working directories
//! ```

use std::path::PathBuf;

pub const APP_NAME: &str = "pkgrepo";

/// Overrides the data directory.
pub const DATA_ENV: &str = "PKGREPO_DATA";
/// Command run by the shell executor for every build.
pub const BUILD_CMD_ENV: &str = "PKGREPO_BUILD_CMD";
/// Shell used to run the build command.
pub const SHELL_ENV: &str = "PKGREPO_SHELL";
/// Comma-separated list of users allowed to mutate state.
pub const USERS_ENV: &str = "PKGREPO_USERS";

pub const DEFAULT_BUILD_COMMAND: &str = "make";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
  pub data_dir: PathBuf,
  pub build_command: String,
  /// If None, builds run under `/bin/sh -c` (Unix) or PowerShell (Windows).
  pub shell: Option<String>,
  /// Empty means any logged-in user.
  pub allowed_users: Vec<String>,
}

impl ServiceConfig {
  pub fn new(data_dir: impl Into<PathBuf>) -> Self {
    Self {
      data_dir: data_dir.into(),
      build_command: DEFAULT_BUILD_COMMAND.to_string(),
      shell: None,
      allowed_users: Vec::new(),
    }
  }

  /// Build the configuration from `PKGREPO_*` environment variables.
  pub fn from_env() -> Self {
    let build_command = non_empty_var(BUILD_CMD_ENV).unwrap_or_else(|| DEFAULT_BUILD_COMMAND.to_string());
    let shell = non_empty_var(SHELL_ENV);
    let allowed_users = non_empty_var(USERS_ENV)
      .map(|users| {
        users
          .split(',')
          .map(str::trim)
          .filter(|u| !u.is_empty())
          .map(String::from)
          .collect()
      })
      .unwrap_or_default();

    Self {
      data_dir: data_dir(),
      build_command,
      shell,
      allowed_users,
    }
  }

  pub fn with_build_command(mut self, command: impl Into<String>) -> Self {
    self.build_command = command.into();
    self
  }

  pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
    self.shell = Some(shell.into());
    self
  }

  pub fn logs_dir(&self) -> PathBuf {
    self.data_dir.join("logs")
  }

  pub fn locks_dir(&self) -> PathBuf {
    self.data_dir.join("locks")
  }

  pub fn work_dir(&self) -> PathBuf {
    self.data_dir.join("work")
  }
}

fn non_empty_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var_os("USERPROFILE").map(PathBuf::from).unwrap_or_default()
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default()
}

/// Returns the data directory, honoring `PKGREPO_DATA`.
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  if let Some(dir) = non_empty_var(DATA_ENV) {
    return PathBuf::from(dir);
  }
  std::env::var_os("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(home_dir)
    .join(APP_NAME)
}

/// Returns the data directory, honoring `PKGREPO_DATA`.
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  if let Some(dir) = non_empty_var(DATA_ENV) {
    return PathBuf::from(dir);
  }
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}
