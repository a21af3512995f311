//! JSON file record store.
//!
//! # Storage Layout
//!
//! ```text
//! {data_dir}/
//! ├── records.json        # Records: id counters, repos, packages
//! └── records.lock        # RecordsLock, held while one mutation is applied
//! ```
//!
//! Several processes may share one data directory. Reads parse the current
//! `records.json` and take no lock: writers replace the file by renaming a
//! temp file over it, so a reader sees either the old or the new document.
//! Writers hold [`RecordsLock`] for the whole read-modify-rename cycle and
//! always start from the file, never from an earlier snapshot.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::lock::RecordsLock;
use crate::types::{BuildState, Package, PackageId, Repo, RepoId};

use super::{RECORDS_VERSION, RecordStore, Records, StoreError};

/// Records file name within the data directory.
pub const RECORDS_FILENAME: &str = "records.json";

#[derive(Debug)]
pub struct FileStore {
  data_dir: PathBuf,
  path: PathBuf,
  /// Serializes writers of this process before they contend for the file lock.
  writes: Mutex<()>,
}

impl FileStore {
  /// Open (or initialize) the store in `data_dir`.
  ///
  /// A missing records file is treated as an empty store; the file is only
  /// created on the first mutation.
  pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
    fs::create_dir_all(data_dir).map_err(StoreError::CreateDir)?;
    let store = Self {
      data_dir: data_dir.to_path_buf(),
      path: data_dir.join(RECORDS_FILENAME),
      writes: Mutex::new(()),
    };

    let records = store.load()?;
    debug!(
      path = %store.path.display(),
      repos = records.repos.len(),
      packages = records.packages.len(),
      "opened record store"
    );

    Ok(store)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn load(&self) -> Result<Records, StoreError> {
    let records = match fs::read_to_string(&self.path) {
      Ok(content) => serde_json::from_str::<Records>(&content).map_err(StoreError::Parse)?,
      Err(e) if e.kind() == io::ErrorKind::NotFound => Records::default(),
      Err(e) => return Err(StoreError::Read(e)),
    };

    if records.version != RECORDS_VERSION {
      return Err(StoreError::UnsupportedVersion(records.version));
    }
    Ok(records)
  }

  fn persist(&self, records: &Records) -> Result<(), StoreError> {
    let temp_path = self.path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(records).map_err(StoreError::Serialize)?;
    fs::write(&temp_path, content).map_err(StoreError::Write)?;
    fs::rename(&temp_path, &self.path).map_err(StoreError::Write)?;
    Ok(())
  }

  fn read<T>(&self, f: impl FnOnce(&Records) -> T) -> Result<T, StoreError> {
    Ok(f(&self.load()?))
  }

  fn write<T>(&self, f: impl FnOnce(&mut Records) -> Result<T, StoreError>) -> Result<T, StoreError> {
    let _writes = self.writes.lock().map_err(|_| StoreError::Poisoned)?;
    let _lock = RecordsLock::acquire(&self.data_dir).map_err(StoreError::Lock)?;

    let mut records = self.load()?;
    let value = f(&mut records)?;
    self.persist(&records)?;
    Ok(value)
  }
}

impl RecordStore for FileStore {
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
