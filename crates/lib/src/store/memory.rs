//! In-process record store.

use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::types::{BuildState, Package, PackageId, Repo, RepoId};

use super::{RecordStore, Records, StoreError};

/// Record store that keeps everything in memory behind an `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStore {
  records: RwLock<Records>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn read<T>(&self, f: impl FnOnce(&Records) -> T) -> Result<T, StoreError> {
    let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
    Ok(f(&records))
  }

  fn write<T>(&self, f: impl FnOnce(&mut Records) -> Result<T, StoreError>) -> Result<T, StoreError> {
    let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
    f(&mut records)
  }
}

impl RecordStore for MemoryStore {
  fn create_repo(&self, name: &str) -> Result<Repo, StoreError> {
    self.write(|r| r.create_repo(name))
  }

  fn repo(&self, id: RepoId) -> Result<Option<Repo>, StoreError> {
    self.read(|r| r.repo(id).cloned())
  }

  fn repo_by_name(&self, name: &str) -> Result<Option<Repo>, StoreError> {
    self.read(|r| r.repo_by_name(name).cloned())
  }

  fn repos(&self) -> Result<Vec<Repo>, StoreError> {
    self.read(|r| r.repos.clone())
  }

  fn create_package(&self, repo_id: RepoId, name: &str) -> Result<Package, StoreError> {
    self.write(|r| r.create_package(repo_id, name))
  }

  fn package(&self, id: PackageId) -> Result<Option<Package>, StoreError> {
    self.read(|r| r.package(id).cloned())
  }

  fn package_by_name(&self, repo_id: RepoId, name: &str) -> Result<Option<Package>, StoreError> {
    self.read(|r| r.package_by_name(repo_id, name).cloned())
  }

  fn packages(&self, repo_id: Option<RepoId>) -> Result<Vec<Package>, StoreError> {
    self.read(|r| r.packages(repo_id))
  }

  fn set_build_state(&self, id: PackageId, state: BuildState) -> Result<(), StoreError> {
    self.write(|r| r.set_build_state(id, state))
  }

  fn commit_build_state(
    &self,
    id: PackageId,
    next: BuildState,
    require_dependencies: bool,
  ) -> Result<BuildState, StoreError> {
    self.write(|r| r.commit_build_state(id, next, require_dependencies))
  }

  fn set_dependencies(&self, id: PackageId, dependencies: BTreeSet<PackageId>) -> Result<(), StoreError> {
    self.write(|r| r.set_dependencies(id, dependencies))
  }

  fn set_package_repo(&self, id: PackageId, repo_id: RepoId) -> Result<(), StoreError> {
    self.write(|r| r.set_package_repo(id, repo_id))
  }
}
