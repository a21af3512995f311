//! Durable storage for repo and package records.
//!
//! The orchestrator only needs a narrow CRUD contract, captured by
//! [`RecordStore`]. Every mutation is applied under the store's lock so a
//! concurrent reader observes either the old or the new record, never a
//! partially applied one. Name uniqueness is enforced inside the store as
//! well, which makes "check then insert" races impossible.
//!
//! Build state changes go through [`RecordStore::commit_build_state`], which
//! validates the transition and, for `Queued` and `Succeeded`, the
//! dependency gate inside the same write. Nothing can change a dependency
//! between the check and the commit.
//!
//! # Submodules
//!
//! - [`memory`] - in-process store used by tests and embedders
//! - [`file`] - JSON document store under the data directory

pub mod file;
pub mod memory;

use std::collections::BTreeSet;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{self, Blocker, GateVerdict};
use crate::lock::LockError;
use crate::types::{BuildState, Package, PackageId, Repo, RepoId};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Current version of the on-disk records document.
pub const RECORDS_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("{what} '{name}' already exists")]
  Duplicate { what: &'static str, name: String },

  #[error("{what} {id} not found")]
  Missing { what: &'static str, id: String },

  #[error("failed to create data directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to read records: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write records: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse records: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize records: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("illegal build state transition {from} -> {to} for package {id}")]
  Transition {
    id: PackageId,
    from: BuildState,
    to: BuildState,
  },

  #[error("dependencies of package {id} are not satisfied")]
  Blocked { id: PackageId, blockers: Vec<Blocker> },

  #[error("failed to lock records: {0}")]
  Lock(#[source] LockError),

  #[error("unsupported records version {0}")]
  UnsupportedVersion(u32),

  #[error("record store lock poisoned")]
  Poisoned,
}

/// Storage contract consumed by the registries and the build scheduler.
pub trait RecordStore: Send + Sync {
  /// Persist a new repo. Fails with `Duplicate` if the name is taken.
  fn create_repo(&self, name: &str) -> Result<Repo, StoreError>;

  fn repo(&self, id: RepoId) -> Result<Option<Repo>, StoreError>;

  fn repo_by_name(&self, name: &str) -> Result<Option<Repo>, StoreError>;

  /// All repos in creation order.
  fn repos(&self) -> Result<Vec<Repo>, StoreError>;

  /// Persist a new, unbuilt package. Fails with `Missing` if the repo does
  /// not exist and `Duplicate` if the repo already has a package of that name.
  fn create_package(&self, repo_id: RepoId, name: &str) -> Result<Package, StoreError>;

  fn package(&self, id: PackageId) -> Result<Option<Package>, StoreError>;

  fn package_by_name(&self, repo_id: RepoId, name: &str) -> Result<Option<Package>, StoreError>;

  /// Packages in creation order, optionally restricted to one repo.
  fn packages(&self, repo_id: Option<RepoId>) -> Result<Vec<Package>, StoreError>;

  /// Overwrite the build state without any check.
  fn set_build_state(&self, id: PackageId, state: BuildState) -> Result<(), StoreError>;

  /// Commit `next` as one atomic step and return the state it replaced.
  ///
  /// Fails with `Transition` if the stored state cannot move to `next`, and
  /// with `Blocked` if `require_dependencies` is set and a direct dependency
  /// is not `Succeeded` in the same repo.
  fn commit_build_state(
    &self,
    id: PackageId,
    next: BuildState,
    require_dependencies: bool,
  ) -> Result<BuildState, StoreError>;

  fn set_dependencies(&self, id: PackageId, dependencies: BTreeSet<PackageId>) -> Result<(), StoreError>;

  /// Move a package to another repo, clearing its dependency set.
  fn set_package_repo(&self, id: PackageId, repo_id: RepoId) -> Result<(), StoreError>;
}

/// The complete record set.
///
/// Both store backends hold one of these behind a lock; the file backend
/// also serializes it as a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Records {
  pub version: u32,
  pub next_repo_id: u64,
  pub next_package_id: u64,
  /// Ascending by id.
  pub repos: Vec<Repo>,
  /// Ascending by id.
  pub packages: Vec<Package>,
}

impl Default for Records {
  fn default() -> Self {
    Self {
      version: RECORDS_VERSION,
      next_repo_id: 1,
      next_package_id: 1,
      repos: Vec::new(),
      packages: Vec::new(),
    }
  }
}

impl Records {
  pub fn create_repo(&mut self, name: &str) -> Result<Repo, StoreError> {
    if self.repo_by_name(name).is_some() {
      return Err(StoreError::Duplicate {
        what: "repo",
        name: name.to_string(),
      });
    }

    let repo = Repo {
      id: RepoId(self.next_repo_id),
      name: name.to_string(),
    };
    self.next_repo_id += 1;
    self.repos.push(repo.clone());
    Ok(repo)
  }

  pub fn repo(&self, id: RepoId) -> Option<&Repo> {
    self.repos.iter().find(|r| r.id == id)
  }

  pub fn repo_by_name(&self, name: &str) -> Option<&Repo> {
    self.repos.iter().find(|r| r.name == name)
  }

  pub fn create_package(&mut self, repo_id: RepoId, name: &str) -> Result<Package, StoreError> {
    if self.repo(repo_id).is_none() {
      return Err(missing_repo(repo_id));
    }
    if self.package_by_name(repo_id, name).is_some() {
      return Err(StoreError::Duplicate {
        what: "package",
        name: name.to_string(),
      });
    }

    let package = Package::new(PackageId(self.next_package_id), name, repo_id);
    self.next_package_id += 1;
    self.packages.push(package.clone());
    Ok(package)
  }

  pub fn package(&self, id: PackageId) -> Option<&Package> {
    self.packages.iter().find(|p| p.id == id)
  }

  pub fn package_by_name(&self, repo_id: RepoId, name: &str) -> Option<&Package> {
    self.packages.iter().find(|p| p.repo_id == repo_id && p.name == name)
  }

  pub fn packages(&self, repo_id: Option<RepoId>) -> Vec<Package> {
    self
      .packages
      .iter()
      .filter(|p| repo_id.is_none_or(|id| p.repo_id == id))
      .cloned()
      .collect()
  }

  fn package_mut(&mut self, id: PackageId) -> Result<&mut Package, StoreError> {
    self.packages.iter_mut().find(|p| p.id == id).ok_or_else(|| missing_package(id))
  }

  pub fn set_build_state(&mut self, id: PackageId, state: BuildState) -> Result<(), StoreError> {
    self.package_mut(id)?.build_state = state;
    Ok(())
  }

  pub fn commit_build_state(
    &mut self,
    id: PackageId,
    next: BuildState,
    require_dependencies: bool,
  ) -> Result<BuildState, StoreError> {
    let package = self.package(id).ok_or_else(|| missing_package(id))?;
    let from = package.build_state;
    if !from.can_transition_to(next) {
      return Err(StoreError::Transition { id, from, to: next });
    }

    if require_dependencies {
      let verdict = graph::evaluate(package, |dep| self.package(dep).map(|d| (d.repo_id, d.build_state)));
      if let GateVerdict::Blocked(blockers) = verdict {
        return Err(StoreError::Blocked { id, blockers });
      }
    }

    self.package_mut(id)?.build_state = next;
    Ok(from)
  }

  pub fn set_dependencies(&mut self, id: PackageId, dependencies: BTreeSet<PackageId>) -> Result<(), StoreError> {
    self.package_mut(id)?.dependencies = dependencies;
    Ok(())
  }

  pub fn set_package_repo(&mut self, id: PackageId, repo_id: RepoId) -> Result<(), StoreError> {
    if self.repo(repo_id).is_none() {
      return Err(missing_repo(repo_id));
    }

    let name = self.package(id).ok_or_else(|| missing_package(id))?.name.clone();
    if let Some(existing) = self.package_by_name(repo_id, &name)
      && existing.id != id
    {
      return Err(StoreError::Duplicate { what: "package", name });
    }

    let package = self.package_mut(id)?;
    package.repo_id = repo_id;
    package.dependencies.clear();
    Ok(())
  }
}

fn missing_repo(id: RepoId) -> StoreError {
  StoreError::Missing {
    what: "repo",
    id: id.to_string(),
  }
}

fn missing_package(id: PackageId) -> StoreError {
  StoreError::Missing {
    what: "package",
    id: id.to_string(),
  }
}
