//! Shared fixtures for library tests.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use pkgrepo_lib::PackageService;
use pkgrepo_lib::auth::{Session, SessionAuthenticator};
use pkgrepo_lib::build::{BuildExecutor, BuildJob, ExecutorError};
use pkgrepo_lib::log::{LogRegistry, LogWriter};
use pkgrepo_lib::store::{MemoryStore, RecordStore, StoreError};
use pkgrepo_lib::types::{BuildState, Package, PackageId, Repo, RepoId};

/// Executor that writes `start`/`finish` lines around a permit wait.
pub struct ScriptedExecutor {
  permits: Semaphore,
  failing: Mutex<HashSet<String>>,
}

impl ScriptedExecutor {
  /// Builds finish immediately.
  pub fn open() -> Arc<Self> {
    Arc::new(Self {
      permits: Semaphore::new(Semaphore::MAX_PERMITS),
      failing: Mutex::default(),
    })
  }

  /// Builds block until `release` is called.
  pub fn gated() -> Arc<Self> {
    Arc::new(Self {
      permits: Semaphore::new(0),
      failing: Mutex::default(),
    })
  }

  pub fn release(&self, builds: usize) {
    self.permits.add_permits(builds);
  }

  /// Make every build of `name` fail.
  pub fn fail(&self, name: &str) {
    self.failing.lock().unwrap().insert(name.to_string());
  }
}

#[async_trait]
impl BuildExecutor for ScriptedExecutor {
  async fn execute(&self, job: &BuildJob, log: LogWriter) -> Result<(), ExecutorError> {
    let name = &job.package.name;
    log.write_line(&format!("start {}", name))?;
    let permit = self
      .permits
      .acquire()
      .await
      .map_err(|e| ExecutorError::Other(e.to_string()))?;
    permit.forget();
    log.write_line(&format!("finish {}", name))?;

    if self.failing.lock().unwrap().contains(name) {
      return Err(ExecutorError::Other(format!("scripted failure of {}", name)));
    }
    Ok(())
  }
}

type CommitHook = Box<dyn FnOnce(&MemoryStore) + Send>;

/// Memory store that records every build state it is asked to commit.
///
/// A hook can run against the underlying records right before a chosen
/// commit, standing in for another writer that got there first.
#[derive(Default)]
pub struct RecordingStore {
  inner: MemoryStore,
  transitions: Mutex<Vec<(PackageId, BuildState)>>,
  hook: Mutex<Option<(PackageId, BuildState, CommitHook)>>,
}

impl RecordingStore {
  pub fn before_commit(&self, id: PackageId, state: BuildState, hook: impl FnOnce(&MemoryStore) + Send + 'static) {
    *self.hook.lock().unwrap() = Some((id, state, Box::new(hook)));
  }

  pub fn transitions_of(&self, id: PackageId) -> Vec<BuildState> {
    self
      .transitions
      .lock()
      .unwrap()
      .iter()
      .filter(|(pkg, _)| *pkg == id)
      .map(|(_, state)| *state)
      .collect()
  }
}

impl RecordStore for RecordingStore {
  fn create_repo(&self, name: &str) -> Result<Repo, StoreError> {
    self.inner.create_repo(name)
  }

  fn repo(&self, id: RepoId) -> Result<Option<Repo>, StoreError> {
    self.inner.repo(id)
  }

  fn repo_by_name(&self, name: &str) -> Result<Option<Repo>, StoreError> {
    self.inner.repo_by_name(name)
  }

  fn repos(&self) -> Result<Vec<Repo>, StoreError> {
    self.inner.repos()
  }

  fn create_package(&self, repo_id: RepoId, name: &str) -> Result<Package, StoreError> {
    self.inner.create_package(repo_id, name)
  }

  fn package(&self, id: PackageId) -> Result<Option<Package>, StoreError> {
    self.inner.package(id)
  }

  fn package_by_name(&self, repo_id: RepoId, name: &str) -> Result<Option<Package>, StoreError> {
    self.inner.package_by_name(repo_id, name)
  }

  fn packages(&self, repo_id: Option<RepoId>) -> Result<Vec<Package>, StoreError> {
    self.inner.packages(repo_id)
  }

  fn set_build_state(&self, id: PackageId, state: BuildState) -> Result<(), StoreError> {
    self.inner.set_build_state(id, state)?;
    self.transitions.lock().unwrap().push((id, state));
    Ok(())
  }

  fn commit_build_state(
    &self,
    id: PackageId,
    next: BuildState,
    require_dependencies: bool,
  ) -> Result<BuildState, StoreError> {
    let hook = {
      let mut slot = self.hook.lock().unwrap();
      match slot.take() {
        Some((hook_id, state, hook)) if hook_id == id && state == next => Some(hook),
        other => {
          *slot = other;
          None
        }
      }
    };
    if let Some(hook) = hook {
      hook(&self.inner);
    }

    let from = self.inner.commit_build_state(id, next, require_dependencies)?;
    self.transitions.lock().unwrap().push((id, next));
    Ok(from)
  }

  fn set_dependencies(&self, id: PackageId, dependencies: BTreeSet<PackageId>) -> Result<(), StoreError> {
    self.inner.set_dependencies(id, dependencies)
  }

  fn set_package_repo(&self, id: PackageId, repo_id: RepoId) -> Result<(), StoreError> {
    self.inner.set_package_repo(id, repo_id)
  }
}

pub struct TestService {
  pub service: PackageService,
  pub store: Arc<RecordingStore>,
  pub executor: Arc<ScriptedExecutor>,
}

impl TestService {
  pub fn new(executor: Arc<ScriptedExecutor>) -> Self {
    let store = Arc::new(RecordingStore::default());
    let service = PackageService::new(
      store.clone(),
      Arc::new(SessionAuthenticator::new()),
      executor.clone(),
      Arc::new(LogRegistry::new()),
    );
    Self {
      service,
      store,
      executor,
    }
  }

  pub fn state(&self, id: PackageId) -> BuildState {
    self.service.package_info(id).unwrap().package.build_state
  }
}

pub fn alice() -> Session {
  Session::user("alice")
}
