//! Service-level error taxonomy.
//!
//! Every failure the orchestrator reports is a [`ServiceError`]. Domain
//! errors are expected outcomes a caller can act on; everything else
//! classifies as [`ErrorKind::Internal`] and only ever leaves the service
//! as a generic message.

use thiserror::Error;

use crate::auth::AuthError;
use crate::graph::Blocker;
use crate::lock::LockError;
use crate::log::LogError;
use crate::store::StoreError;
use crate::types::{BuildState, PackageId, RepoId};

/// Error classes exposed at the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  NotFound,
  Exists,
  InvalidCharacters,
  Dependency,
  NotLoggedIn,
  BuildConflict,
  Internal,
}

impl ErrorKind {
  /// Name carried in the `error` field of API answers.
  pub fn name(self) -> &'static str {
    match self {
      ErrorKind::NotFound => "NotFound",
      ErrorKind::Exists => "Exists",
      ErrorKind::InvalidCharacters => "InvalidCharacters",
      ErrorKind::Dependency => "Dependency",
      ErrorKind::NotLoggedIn => "NotLoggedIn",
      ErrorKind::BuildConflict => "BuildConflict",
      ErrorKind::Internal => "Internal",
    }
  }

  /// HTTP status class for this kind.
  pub fn status_code(self) -> u16 {
    match self {
      ErrorKind::NotFound => 404,
      ErrorKind::Exists | ErrorKind::BuildConflict => 409,
      ErrorKind::InvalidCharacters | ErrorKind::Dependency => 412,
      ErrorKind::NotLoggedIn => 401,
      ErrorKind::Internal => 500,
    }
  }
}

#[derive(Debug, Error)]
pub enum ServiceError {
  #[error("{what} {id} not found")]
  NotFound { what: &'static str, id: String },

  #[error("no logs available for package {0}")]
  NoLogs(PackageId),

  #[error("{what} '{name}' already exists")]
  Exists { what: &'static str, name: String },

  #[error("name '{0}' contains invalid characters")]
  InvalidCharacters(String),

  #[error("package {package} has unsatisfied dependencies: {}", join_blockers(.blockers))]
  Dependency { package: PackageId, blockers: Vec<Blocker> },

  #[error("invalid dependency for package {package}: {reason}")]
  InvalidDependency { package: PackageId, reason: String },

  #[error("not logged in")]
  NotLoggedIn,

  #[error("a build of package {0} is already in progress")]
  BuildConflict(PackageId),

  #[error("storage error: {0}")]
  Store(#[source] StoreError),

  #[error("log error: {0}")]
  Log(#[source] LogError),

  #[error("lock error: {0}")]
  Lock(#[source] LockError),

  #[error("internal error: {0}")]
  Internal(String),
}

impl ServiceError {
  pub fn repo_not_found(id: RepoId) -> Self {
    ServiceError::NotFound {
      what: "repo",
      id: id.to_string(),
    }
  }

  pub fn package_not_found(id: PackageId) -> Self {
    ServiceError::NotFound {
      what: "package",
      id: id.to_string(),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      ServiceError::NotFound { .. } | ServiceError::NoLogs(_) => ErrorKind::NotFound,
      ServiceError::Exists { .. } => ErrorKind::Exists,
      ServiceError::InvalidCharacters(_) => ErrorKind::InvalidCharacters,
      ServiceError::Dependency { .. } | ServiceError::InvalidDependency { .. } => ErrorKind::Dependency,
      ServiceError::NotLoggedIn => ErrorKind::NotLoggedIn,
      ServiceError::BuildConflict(_) => ErrorKind::BuildConflict,
      ServiceError::Store(_) | ServiceError::Log(_) | ServiceError::Lock(_) | ServiceError::Internal(_) => {
        ErrorKind::Internal
      }
    }
  }

  pub fn status_code(&self) -> u16 {
    self.kind().status_code()
  }

  /// Message safe to hand to a remote caller.
  pub fn public_message(&self) -> String {
    match self {
      ServiceError::NoLogs(_) => "No logs available".to_string(),
      err if err.kind() == ErrorKind::Internal => "internal server error".to_string(),
      err => err.to_string(),
    }
  }
}

fn join_blockers(blockers: &[Blocker]) -> String {
  blockers.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl From<StoreError> for ServiceError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::Duplicate { what, name } => ServiceError::Exists { what, name },
      StoreError::Missing { what, id } => ServiceError::NotFound { what, id },
      StoreError::Blocked { id, blockers } => ServiceError::Dependency { package: id, blockers },
      // Another attempt got the package first.
      StoreError::Transition {
        id,
        from,
        to: BuildState::Queued,
      } if from.is_active() => ServiceError::BuildConflict(id),
      other => ServiceError::Store(other),
    }
  }
}

impl From<LogError> for ServiceError {
  fn from(err: LogError) -> Self {
    match err {
      LogError::NoLogs(id) => ServiceError::NoLogs(id),
      other => ServiceError::Log(other),
    }
  }
}

impl From<LockError> for ServiceError {
  fn from(err: LockError) -> Self {
    match err.held_package() {
      Some(package) => ServiceError::BuildConflict(package),
      None => ServiceError::Lock(err),
    }
  }
}

impl From<AuthError> for ServiceError {
  fn from(err: AuthError) -> Self {
    match err {
      AuthError::NotLoggedIn => ServiceError::NotLoggedIn,
    }
  }
}
