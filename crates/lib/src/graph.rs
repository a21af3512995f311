//! Package dependency graph and the dependency gate.
//!
//! Dependencies form an explicit directed edge set keyed by package id,
//! with an edge `package -> dependency`. The gate only looks at a package's
//! direct dependencies: each must exist, live in the same repo, and be
//! `Succeeded`. Transitive satisfaction is not checked.

use std::collections::BTreeSet;
use std::fmt;

use petgraph::Direction;
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;

use crate::store::{RecordStore, StoreError};
use crate::types::{BuildState, Package, PackageId, RepoId};

/// Why a single dependency blocks a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blocker {
  /// The dependency id does not resolve to a package.
  Missing(PackageId),
  /// The dependency belongs to a different repo.
  OtherRepo(PackageId),
  /// The dependency exists but is not `Succeeded`.
  NotBuilt(PackageId, BuildState),
}

impl fmt::Display for Blocker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Blocker::Missing(id) => write!(f, "package {} does not exist", id),
      Blocker::OtherRepo(id) => write!(f, "package {} belongs to another repo", id),
      Blocker::NotBuilt(id, state) => write!(f, "package {} is {}", id, state),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
  Ready,
  Blocked(Vec<Blocker>),
}

/// Evaluate the gate for `package`, resolving each dependency to its repo
/// and build state through `lookup`.
///
/// The record store calls this inside its own write lock when committing,
/// so the verdict and the commit see the same records.
pub fn evaluate(package: &Package, mut lookup: impl FnMut(PackageId) -> Option<(RepoId, BuildState)>) -> GateVerdict {
  let blockers: Vec<Blocker> = package
    .dependencies
    .iter()
    .filter_map(|&dep_id| match lookup(dep_id) {
      None => Some(Blocker::Missing(dep_id)),
      Some((repo_id, _)) if repo_id != package.repo_id => Some(Blocker::OtherRepo(dep_id)),
      Some((_, state)) if state != BuildState::Succeeded => Some(Blocker::NotBuilt(dep_id, state)),
      Some(_) => None,
    })
    .collect();

  if blockers.is_empty() {
    GateVerdict::Ready
  } else {
    GateVerdict::Blocked(blockers)
  }
}

/// Dependency edges between the packages of one repo, `package -> dependency`.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
  graph: DiGraphMap<PackageId, ()>,
}

impl DependencyGraph {
  pub fn from_packages<'a>(packages: impl IntoIterator<Item = &'a Package>) -> Self {
    let mut graph = DiGraphMap::new();
    for package in packages {
      graph.add_node(package.id);
      for &dep in &package.dependencies {
        graph.add_edge(package.id, dep, ());
      }
    }
    Self { graph }
  }

  pub fn for_repo(store: &dyn RecordStore, repo_id: RepoId) -> Result<Self, StoreError> {
    let packages = store.packages(Some(repo_id))?;
    Ok(Self::from_packages(&packages))
  }

  /// Packages that declare `id` as a direct dependency, ascending.
  pub fn dependents_of(&self, id: PackageId) -> Vec<PackageId> {
    if !self.graph.contains_node(id) {
      return Vec::new();
    }
    let mut dependents: Vec<PackageId> = self.graph.neighbors_directed(id, Direction::Incoming).collect();
    dependents.sort();
    dependents
  }

  /// Whether replacing the edges of `package` with `dependencies` would
  /// close a cycle.
  pub fn would_cycle(&self, package: PackageId, dependencies: &BTreeSet<PackageId>) -> bool {
    let mut candidate = self.graph.clone();
    let current: Vec<PackageId> = candidate.neighbors(package).collect();
    for dep in current {
      candidate.remove_edge(package, dep);
    }
    for &dep in dependencies {
      candidate.add_edge(package, dep, ());
    }
    is_cyclic_directed(&candidate)
  }
}
