//! Repository registry.

use std::sync::Arc;

use tracing::info;

use crate::error::ServiceError;
use crate::store::RecordStore;
use crate::types::{Repo, RepoSummary};

/// Check a repo name against the allowed character set: ASCII letters,
/// digits, `-`, `_` and `.`. Empty names are rejected.
pub fn validate_name(name: &str) -> Result<(), ServiceError> {
  let valid = !name.is_empty()
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

  if valid {
    Ok(())
  } else {
    Err(ServiceError::InvalidCharacters(name.to_string()))
  }
}

pub struct RepoRegistry {
  store: Arc<dyn RecordStore>,
}

impl RepoRegistry {
  pub fn new(store: Arc<dyn RecordStore>) -> Self {
    Self { store }
  }

  /// Create a repo. The store rejects a concurrent duplicate on insert.
  pub fn create(&self, name: &str) -> Result<Repo, ServiceError> {
    validate_name(name)?;

    if self.store.repo_by_name(name)?.is_some() {
      return Err(ServiceError::Exists {
        what: "repo",
        name: name.to_string(),
      });
    }

    let repo = self.store.create_repo(name)?;
    info!(repo = %repo.id, name = %repo.name, "repo created");
    Ok(repo)
  }

  /// All repos, in creation order.
  pub fn list(&self) -> Result<Vec<RepoSummary>, ServiceError> {
    Ok(self.store.repos()?.into_iter().map(RepoSummary::from).collect())
  }
}
