//! Package admission and dependency edits.
//!
//! Dependency sets and repo membership change the repo's graph, so those
//! edits are serialized by one mutex: the cycle check and the write happen
//! as a unit.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::error::ServiceError;
use crate::graph::DependencyGraph;
use crate::store::RecordStore;
use crate::types::{Package, PackageId, PackageSummary, RepoId};

pub struct PackageRegistry {
  store: Arc<dyn RecordStore>,
  edits: Mutex<()>,
}

impl PackageRegistry {
  pub fn new(store: Arc<dyn RecordStore>) -> Self {
    Self {
      store,
      edits: Mutex::new(()),
    }
  }

  /// Register an unbuilt package without dependencies in `repo_id`.
  pub fn register(&self, name: &str, repo_id: RepoId) -> Result<Package, ServiceError> {
    if name.trim().is_empty() {
      return Err(ServiceError::InvalidCharacters(name.to_string()));
    }

    if self.store.repo(repo_id)?.is_none() {
      return Err(ServiceError::repo_not_found(repo_id));
    }

    if self.store.package_by_name(repo_id, name)?.is_some() {
      return Err(ServiceError::Exists {
        what: "package",
        name: name.to_string(),
      });
    }

    let package = self.store.create_package(repo_id, name)?;
    info!(package = %package.id, name = %package.name, repo = %repo_id, "package registered");
    Ok(package)
  }

  pub fn get(&self, id: PackageId) -> Result<Package, ServiceError> {
    self.store.package(id)?.ok_or_else(|| ServiceError::package_not_found(id))
  }

  /// Packages of the same repo that depend directly on `package`.
  pub fn dependents(&self, package: &Package) -> Result<Vec<PackageId>, ServiceError> {
    let graph = DependencyGraph::for_repo(self.store.as_ref(), package.repo_id)?;
    Ok(graph.dependents_of(package.id))
  }

  /// Packages of one repo, or of all repos, in creation order.
  pub fn list(&self, repo_id: Option<RepoId>) -> Result<Vec<PackageSummary>, ServiceError> {
    if let Some(repo_id) = repo_id
      && self.store.repo(repo_id)?.is_none()
    {
      return Err(ServiceError::repo_not_found(repo_id));
    }

    Ok(
      self
        .store
        .packages(repo_id)?
        .into_iter()
        .map(PackageSummary::from)
        .collect(),
    )
  }

  /// Replace the dependency set of `id`.
  pub fn set_dependencies(&self, id: PackageId, dependencies: BTreeSet<PackageId>) -> Result<Package, ServiceError> {
    let _edits = self.edits.lock().unwrap_or_else(PoisonError::into_inner);

    let package = self.get(id)?;
    if package.build_state.is_active() {
      return Err(ServiceError::BuildConflict(id));
    }

    for &dep_id in &dependencies {
      if dep_id == id {
        return Err(invalid_dependency(id, "a package cannot depend on itself"));
      }
      let dep = self.get(dep_id)?;
      if dep.repo_id != package.repo_id {
        return Err(invalid_dependency(
          id,
          format!("package {} belongs to another repo", dep_id),
        ));
      }
    }

    let graph = DependencyGraph::for_repo(self.store.as_ref(), package.repo_id)?;
    if graph.would_cycle(id, &dependencies) {
      return Err(invalid_dependency(id, "dependencies would form a cycle"));
    }

    self.store.set_dependencies(id, dependencies.clone())?;
    info!(package = %id, count = dependencies.len(), "dependencies updated");

    Ok(Package { dependencies, ..package })
  }

  /// Move `id` into `repo_id`, dropping its dependencies.
  pub fn reassign(&self, id: PackageId, repo_id: RepoId) -> Result<Package, ServiceError> {
    let _edits = self.edits.lock().unwrap_or_else(PoisonError::into_inner);

    let package = self.get(id)?;
    if self.store.repo(repo_id)?.is_none() {
      return Err(ServiceError::repo_not_found(repo_id));
    }
    if package.build_state.is_active() {
      return Err(ServiceError::BuildConflict(id));
    }
    if package.repo_id == repo_id {
      return Ok(package);
    }

    self.store.set_package_repo(id, repo_id)?;
    info!(package = %id, from = %package.repo_id, to = %repo_id, "package reassigned");

    Ok(Package {
      repo_id,
      dependencies: BTreeSet::new(),
      ..package
    })
  }
}

fn invalid_dependency(package: PackageId, reason: impl Into<String>) -> ServiceError {
  ServiceError::InvalidDependency {
    package,
    reason: reason.into(),
  }
}
