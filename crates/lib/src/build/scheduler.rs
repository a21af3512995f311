//! Build scheduler.
//!
//! Each package has one execution slot. A request claims the slot (and,
//! with build locks enabled, the package's cross-process [`BuildLock`]),
//! then commits `Queued` and `Building`. A supervisor task awaits the
//! executor, commits the terminal state, seals the log and releases the
//! slot. The slot is an RAII guard, so every exit path, including an
//! executor panic, frees it.
//!
//! `Queued` and `Succeeded` are committed with the dependency gate checked
//! inside the same store write, so a dependency can never regress between
//! the check and the commit.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ServiceError;
use crate::lock::BuildLock;
use crate::log::{LogReader, LogRegistry, LogSink};
use crate::store::{RecordStore, StoreError};
use crate::types::{BuildState, PackageId};

use super::executor::{BuildExecutor, BuildJob};

/// Terminal result of one build attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BuildOutcome {
  Succeeded,
  Failed { reason: String },
}

impl BuildOutcome {
  pub fn state(&self) -> BuildState {
    match self {
      BuildOutcome::Succeeded => BuildState::Succeeded,
      BuildOutcome::Failed { .. } => BuildState::Failed,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, BuildOutcome::Succeeded)
  }

  fn failed(reason: impl Into<String>) -> Self {
    BuildOutcome::Failed { reason: reason.into() }
  }
}

/// A running build. Dropping it detaches from the build without cancelling it.
#[derive(Debug)]
pub struct BuildHandle {
  package_id: PackageId,
  log: LogSink,
  outcome: JoinHandle<BuildOutcome>,
}

impl BuildHandle {
  pub fn package_id(&self) -> PackageId {
    self.package_id
  }

  pub fn log(&self) -> &LogSink {
    &self.log
  }

  pub fn attach_reader(&self) -> LogReader {
    self.log.attach_reader()
  }

  /// Wait for the terminal outcome. By then the state is committed, the log
  /// is sealed and the slot is free.
  pub async fn wait(self) -> BuildOutcome {
    match self.outcome.await {
      Ok(outcome) => outcome,
      Err(err) => BuildOutcome::failed(format!("build supervisor aborted: {}", err)),
    }
  }
}

#[derive(Debug, Default)]
struct SlotTable {
  busy: Mutex<HashSet<PackageId>>,
}

impl SlotTable {
  fn try_acquire(self: &Arc<Self>, package_id: PackageId, claim: Option<BuildLock>) -> Option<SlotGuard> {
    let inserted = self
      .busy
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(package_id);
    inserted.then(|| SlotGuard {
      table: Arc::clone(self),
      package_id,
      _claim: claim,
    })
  }

  fn is_busy(&self, package_id: PackageId) -> bool {
    self
      .busy
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .contains(&package_id)
  }
}

struct SlotGuard {
  table: Arc<SlotTable>,
  package_id: PackageId,
  /// Released after the slot, once the terminal state is committed.
  _claim: Option<BuildLock>,
}

impl Drop for SlotGuard {
  fn drop(&mut self) {
    self
      .table
      .busy
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&self.package_id);
    debug!(package = %self.package_id, "build slot released");
  }
}

#[derive(Clone)]
pub struct Scheduler {
  store: Arc<dyn RecordStore>,
  executor: Arc<dyn BuildExecutor>,
  logs: Arc<LogRegistry>,
  slots: Arc<SlotTable>,
  build_locks: Option<PathBuf>,
}

impl Scheduler {
  pub fn new(store: Arc<dyn RecordStore>, executor: Arc<dyn BuildExecutor>, logs: Arc<LogRegistry>) -> Self {
    Self {
      store,
      executor,
      logs,
      slots: Arc::default(),
      build_locks: None,
    }
  }

  /// Hold a [`BuildLock`] in `dir` for every build, so processes sharing
  /// the records can tell each other's builds from abandoned ones.
  pub fn with_build_locks(mut self, dir: impl Into<PathBuf>) -> Self {
    self.build_locks = Some(dir.into());
    self
  }

  pub fn logs(&self) -> &Arc<LogRegistry> {
    &self.logs
  }

  /// Whether a build of `package_id` is running, here or in a live process
  /// sharing the records. An active record nobody owns does not count.
  pub fn build_in_progress(&self, package_id: PackageId) -> bool {
    if self.slots.is_busy(package_id) {
      return true;
    }
    let active = matches!(self.store.package(package_id), Ok(Some(package)) if package.build_state.is_active());
    if !active {
      return false;
    }
    match &self.build_locks {
      Some(dir) => matches!(BuildLock::try_acquire(dir, package_id), Err(err) if err.held_package().is_some()),
      None => false,
    }
  }

  /// Start a build of `package_id`.
  ///
  /// Returns as soon as the package is `Building`; the build itself runs on
  /// a spawned task, so this must be called from within a tokio runtime.
  pub fn request_build(&self, package_id: PackageId) -> Result<BuildHandle, ServiceError> {
    if self.store.package(package_id)?.is_none() {
      return Err(ServiceError::package_not_found(package_id));
    }

    let claim = self
      .build_locks
      .as_deref()
      .map(|dir| BuildLock::try_acquire(dir, package_id))
      .transpose()?;
    let slot = self
      .slots
      .try_acquire(package_id, claim)
      .ok_or(ServiceError::BuildConflict(package_id))?;

    // Reload under the slot; the record may have changed since the lookup.
    let package = self
      .store
      .package(package_id)?
      .ok_or_else(|| ServiceError::package_not_found(package_id))?;
    let repo_name = self
      .store
      .repo(package.repo_id)?
      .map(|repo| repo.name)
      .ok_or_else(|| ServiceError::repo_not_found(package.repo_id))?;

    self.commit(package_id, BuildState::Queued).inspect_err(|err| {
      if let ServiceError::Dependency { blockers, .. } = err {
        debug!(package = %package_id, blocked_by = blockers.len(), "dependency gate refused build");
      }
    })?;
    let sink = self.logs.begin(package_id);

    if let Err(err) = self.commit(package_id, BuildState::Building) {
      sink.seal();
      if let Err(rollback) = self.commit(package_id, BuildState::Failed) {
        error!(package = %package_id, error = %rollback, "failed to roll back queued build");
      }
      return Err(err);
    }

    let store_package = self.store.package(package_id)?;
    let job = BuildJob {
      package: store_package.unwrap_or(package),
      repo_name,
    };

    let outcome = tokio::spawn(self.clone().supervise(job, sink.clone(), slot));

    Ok(BuildHandle {
      package_id,
      log: sink,
      outcome,
    })
  }

  /// Mark builds left `Queued` or `Building` by a process that no longer
  /// runs them as failed.
  pub fn recover(&self) -> Result<Vec<PackageId>, ServiceError> {
    let mut recovered = Vec::new();

    for package in self.store.packages(None)? {
      if !package.build_state.is_active() || self.slots.is_busy(package.id) {
        continue;
      }

      let _claim = match &self.build_locks {
        Some(dir) => match BuildLock::try_acquire(dir, package.id) {
          Ok(claim) => Some(claim),
          Err(err) if err.held_package().is_some() => {
            debug!(package = %package.id, "build is running in another process");
            continue;
          }
          Err(err) => return Err(err.into()),
        },
        None => None,
      };

      match self.store.commit_build_state(package.id, BuildState::Failed, false) {
        Ok(from) => {
          warn!(package = %package.id, state = %from, "marking interrupted build as failed");
          recovered.push(package.id);
        }
        // Finished between the listing and the commit.
        Err(StoreError::Transition { .. }) => {}
        Err(err) => return Err(err.into()),
      }
    }

    Ok(recovered)
  }

  async fn supervise(self, job: BuildJob, sink: LogSink, _slot: SlotGuard) -> BuildOutcome {
    let package_id = job.package.id;
    info!(package = %package_id, name = %job.package.name, repo = %job.repo_name, "build started");

    let executor = Arc::clone(&self.executor);
    let writer = sink.writer();
    let run = tokio::spawn(async move { executor.execute(&job, writer).await });

    let outcome = match run.await {
      Ok(Ok(())) => BuildOutcome::Succeeded,
      Ok(Err(err)) => BuildOutcome::failed(err.to_string()),
      Err(err) if err.is_panic() => BuildOutcome::failed("build executor panicked"),
      Err(err) => BuildOutcome::failed(format!("build task aborted: {}", err)),
    };

    let outcome = self.finish(package_id, outcome);
    sink.seal();

    match &outcome {
      BuildOutcome::Succeeded => info!(package = %package_id, "build succeeded"),
      BuildOutcome::Failed { reason } => warn!(package = %package_id, reason = %reason, "build failed"),
    }

    outcome
  }

  /// Commit the terminal state. A success whose dependencies regressed
  /// while it ran is committed as a failure.
  fn finish(&self, package_id: PackageId, outcome: BuildOutcome) -> BuildOutcome {
    let Err(err) = self.commit(package_id, outcome.state()) else {
      return outcome;
    };

    let outcome = match &err {
      ServiceError::Dependency { blockers, .. } => {
        let reasons: Vec<String> = blockers.iter().map(ToString::to_string).collect();
        BuildOutcome::failed(format!(
          "dependencies no longer satisfied at commit: {}",
          reasons.join(", ")
        ))
      }
      err => {
        error!(package = %package_id, error = %err, "failed to commit build result");
        BuildOutcome::failed(format!("failed to record build result: {}", err))
      }
    };

    if let Err(retry) = self.commit(package_id, BuildState::Failed) {
      error!(package = %package_id, error = %retry, "failed to mark build as failed");
    }
    outcome
  }

  /// `Queued` and `Succeeded` require every direct dependency to be
  /// `Succeeded` at the moment of the write.
  fn commit(&self, package_id: PackageId, next: BuildState) -> Result<(), ServiceError> {
    let require_dependencies = matches!(next, BuildState::Queued | BuildState::Succeeded);
    let from = self
      .store
      .commit_build_state(package_id, next, require_dependencies)?;
    debug!(package = %package_id, from = %from, to = %next, "build state committed");
    Ok(())
  }
}
