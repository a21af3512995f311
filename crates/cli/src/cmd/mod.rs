mod build;
mod logs;
mod package;
mod repo;

use anyhow::{Context, Result};

use pkgrepo_lib::PackageService;
use pkgrepo_lib::auth::Session;
use pkgrepo_lib::config::ServiceConfig;

use crate::output::OutputFormat;

pub use build::cmd_build;
pub use logs::cmd_logs;
pub use package::{cmd_package_add, cmd_package_depend, cmd_package_info, cmd_package_list, cmd_package_move};
pub use repo::{cmd_repo_create, cmd_repo_list};

/// Settings shared by every command.
pub struct CmdContext {
  pub config: ServiceConfig,
  pub session: Session,
  pub output: OutputFormat,
  pub verbose: bool,
}

impl CmdContext {
  pub fn new(user: Option<String>, output: OutputFormat, verbose: bool) -> Self {
    Self {
      config: ServiceConfig::from_env(),
      session: Session { user },
      output,
      verbose,
    }
  }

  /// Open the service for a command that changes records. Builds left
  /// behind by dead processes are failed first.
  pub fn open(&self) -> Result<PackageService> {
    PackageService::open(&self.config).with_context(|| self.open_failed())
  }

  /// Open the service for a command that only reads.
  pub fn open_read_only(&self) -> Result<PackageService> {
    PackageService::open_read_only(&self.config).with_context(|| self.open_failed())
  }

  fn open_failed(&self) -> String {
    format!("Failed to open data directory {}", self.config.data_dir.display())
  }
}
