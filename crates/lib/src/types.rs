//! Record types shared across the orchestrator.
//!
//! Repos and packages are plain serializable records. Identifiers are
//! assigned by the record store from monotonically increasing counters, so
//! ordering by id is ordering by creation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(pub u64);

impl fmt::Display for RepoId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub u64);

impl fmt::Display for PackageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Build state of a package.
///
/// ```text
/// Unbuilt ──► Queued ──► Building ──► Succeeded
///               ▲                 └─► Failed
///               └──── Succeeded / Failed (rebuild)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
  #[default]
  Unbuilt,
  Queued,
  Building,
  Succeeded,
  Failed,
}

impl BuildState {
  /// A build is admitted and not yet finished.
  pub fn is_active(self) -> bool {
    matches!(self, BuildState::Queued | BuildState::Building)
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, BuildState::Succeeded | BuildState::Failed)
  }

  /// Whether the scheduler may commit `next` on top of `self`.
  ///
  /// `Queued -> Failed` only happens when a build could not be started or
  /// when an orphaned record is recovered.
  pub fn can_transition_to(self, next: BuildState) -> bool {
    use BuildState::*;
    matches!(
      (self, next),
      (Unbuilt | Succeeded | Failed, Queued) | (Queued, Building | Failed) | (Building, Succeeded | Failed)
    )
  }

  pub fn as_str(self) -> &'static str {
    match self {
      BuildState::Unbuilt => "unbuilt",
      BuildState::Queued => "queued",
      BuildState::Building => "building",
      BuildState::Succeeded => "succeeded",
      BuildState::Failed => "failed",
    }
  }
}

impl fmt::Display for BuildState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
  pub id: RepoId,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
  pub id: PackageId,
  pub name: String,
  pub repo_id: RepoId,
  /// Packages in the same repo that must be `Succeeded` before this one builds.
  #[serde(default)]
  pub dependencies: BTreeSet<PackageId>,
  #[serde(default)]
  pub build_state: BuildState,
}

impl Package {
  pub fn new(id: PackageId, name: impl Into<String>, repo_id: RepoId) -> Self {
    Self {
      id,
      name: name.into(),
      repo_id,
      dependencies: BTreeSet::new(),
      build_state: BuildState::Unbuilt,
    }
  }
}

/// `{id, name}` pair returned by repo listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSummary {
  pub id: RepoId,
  pub name: String,
}

impl From<Repo> for RepoSummary {
  fn from(repo: Repo) -> Self {
    Self {
      id: repo.id,
      name: repo.name,
    }
  }
}

/// `{id, name}` pair returned by package listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSummary {
  pub id: PackageId,
  pub name: String,
}

impl From<Package> for PackageSummary {
  fn from(package: Package) -> Self {
    Self {
      id: package.id,
      name: package.name,
    }
  }
}
