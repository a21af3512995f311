//! The orchestrator as one object.
//!
//! [`PackageService`] wires the registries, the scheduler and the log
//! registry over a shared record store, and checks the caller's session
//! before every mutating operation. Listings, package info and logs are
//! open to anonymous callers.
//!
//! Several processes may open the same data directory. Record writes are
//! serialized by the store, and builds by their per-package build locks.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::auth::{Authenticator, Session, SessionAuthenticator};
use crate::build::{BuildExecutor, BuildHandle, Scheduler, ShellExecutor};
use crate::config::ServiceConfig;
use crate::error::{ErrorKind, ServiceError};
use crate::log::{LogArchive, LogReader, LogRegistry};
use crate::package::PackageRegistry;
use crate::repo::RepoRegistry;
use crate::store::{FileStore, RecordStore};
use crate::types::{Package, PackageId, PackageSummary, Repo, RepoId, RepoSummary};

/// A package record, the packages depending on it, and whether a log can be
/// attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageInfo {
  #[serde(flatten)]
  pub package: Package,
  pub dependents: Vec<PackageId>,
  pub logs_available: bool,
}

pub struct PackageService {
  auth: Arc<dyn Authenticator>,
  repos: RepoRegistry,
  packages: PackageRegistry,
  scheduler: Scheduler,
}

impl PackageService {
  pub fn new(
    store: Arc<dyn RecordStore>,
    auth: Arc<dyn Authenticator>,
    executor: Arc<dyn BuildExecutor>,
    logs: Arc<LogRegistry>,
  ) -> Self {
    Self {
      auth,
      repos: RepoRegistry::new(Arc::clone(&store)),
      packages: PackageRegistry::new(Arc::clone(&store)),
      scheduler: Scheduler::new(store, executor, logs),
    }
  }

  /// Open the service over `config.data_dir` and fail any build that no
  /// live process still owns.
  pub fn open(config: &ServiceConfig) -> Result<Self, ServiceError> {
    let service = Self::open_read_only(config)?;
    let recovered = service.recover()?;
    if !recovered.is_empty() {
      warn!(count = recovered.len(), "recovered interrupted builds");
    }
    Ok(service)
  }

  /// Open the service over `config.data_dir` without touching the records.
  ///
  /// Mutating operations still work; only recovery is skipped.
  pub fn open_read_only(config: &ServiceConfig) -> Result<Self, ServiceError> {
    let store: Arc<dyn RecordStore> = Arc::new(FileStore::open(&config.data_dir)?);
    let logs = LogRegistry::with_archive(LogArchive::new(config.logs_dir()));
    let executor = ShellExecutor::from_config(config);
    let auth = SessionAuthenticator::with_allowed_users(config.allowed_users.clone());

    let service = Self {
      auth: Arc::new(auth),
      repos: RepoRegistry::new(Arc::clone(&store)),
      packages: PackageRegistry::new(Arc::clone(&store)),
      scheduler: Scheduler::new(store, Arc::new(executor), Arc::new(logs)).with_build_locks(config.locks_dir()),
    };
    debug!(data_dir = %config.data_dir.display(), "service opened");
    Ok(service)
  }

  pub fn create_repo(&self, session: &Session, name: &str) -> Result<Repo, ServiceError> {
    report("create_repo", self.login(session).and_then(|()| self.repos.create(name)))
  }

  pub fn list_repos(&self) -> Result<Vec<RepoSummary>, ServiceError> {
    report("list_repos", self.repos.list())
  }

  pub fn add_package(&self, session: &Session, repo_id: RepoId, name: &str) -> Result<Package, ServiceError> {
    report(
      "add_package",
      self.login(session).and_then(|()| self.packages.register(name, repo_id)),
    )
  }

  pub fn list_packages(&self, repo_id: Option<RepoId>) -> Result<Vec<PackageSummary>, ServiceError> {
    report("list_packages", self.packages.list(repo_id))
  }

  pub fn package_info(&self, id: PackageId) -> Result<PackageInfo, ServiceError> {
    report(
      "package_info",
      self.packages.get(id).and_then(|package| {
        Ok(PackageInfo {
          dependents: self.packages.dependents(&package)?,
          logs_available: self.scheduler.logs().has_logs(id),
          package,
        })
      }),
    )
  }

  pub fn set_dependencies(
    &self,
    session: &Session,
    id: PackageId,
    dependencies: BTreeSet<PackageId>,
  ) -> Result<Package, ServiceError> {
    let result = self.login(session).and_then(|()| {
      self.ensure_idle(id)?;
      self.packages.set_dependencies(id, dependencies)
    });
    report("set_dependencies", result)
  }

  pub fn reassign(&self, session: &Session, id: PackageId, repo_id: RepoId) -> Result<Package, ServiceError> {
    let result = self.login(session).and_then(|()| {
      self.ensure_idle(id)?;
      self.packages.reassign(id, repo_id)
    });
    report("reassign", result)
  }

  /// Start a build. Must be called from within a tokio runtime.
  pub fn request_build(&self, session: &Session, id: PackageId) -> Result<BuildHandle, ServiceError> {
    report(
      "request_build",
      self.login(session).and_then(|()| self.scheduler.request_build(id)),
    )
  }

  /// Attach to the latest log of `id`: live in this process, followed
  /// from another process's build, or archived.
  pub fn attach_logs(&self, id: PackageId) -> Result<LogReader, ServiceError> {
    let result = self.packages.get(id).and_then(|_| {
      let scheduler = self.scheduler.clone();
      let running = move || scheduler.build_in_progress(id);
      self.scheduler.logs().attach(id, running).map_err(ServiceError::from)
    });
    report("attach_logs", result)
  }

  pub fn recover(&self) -> Result<Vec<PackageId>, ServiceError> {
    report("recover", self.scheduler.recover())
  }

  fn login(&self, session: &Session) -> Result<(), ServiceError> {
    self.auth.login(session).map_err(ServiceError::from)
  }

  fn ensure_idle(&self, id: PackageId) -> Result<(), ServiceError> {
    if self.scheduler.build_in_progress(id) {
      return Err(ServiceError::BuildConflict(id));
    }
    Ok(())
  }
}

/// Log failures on their way out; internal ones at `error`.
fn report<T>(operation: &'static str, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
  result.inspect_err(|err| match err.kind() {
    ErrorKind::Internal => error!(operation, error = %err, "operation failed"),
    kind => debug!(operation, kind = kind.name(), error = %err, "operation rejected"),
  })
}
