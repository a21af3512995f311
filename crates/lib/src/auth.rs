//! Session authentication in front of mutating operations.

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
  #[error("not logged in")]
  NotLoggedIn,
}

/// The caller's session as handed over by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
  pub user: Option<String>,
}

impl Session {
  pub fn anonymous() -> Self {
    Self::default()
  }

  pub fn user(name: impl Into<String>) -> Self {
    Self {
      user: Some(name.into()),
    }
  }
}

pub trait Authenticator: Send + Sync {
  fn login(&self, session: &Session) -> Result<(), AuthError>;
}

/// Accepts sessions that carry a non-empty user name, optionally restricted
/// to an allow-list.
#[derive(Debug, Clone, Default)]
pub struct SessionAuthenticator {
  allowed_users: Vec<String>,
}

impl SessionAuthenticator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_allowed_users(allowed_users: Vec<String>) -> Self {
    Self { allowed_users }
  }
}

impl Authenticator for SessionAuthenticator {
  fn login(&self, session: &Session) -> Result<(), AuthError> {
    let Some(user) = session.user.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
      return Err(AuthError::NotLoggedIn);
    };

    if !self.allowed_users.is_empty() && !self.allowed_users.iter().any(|u| u == user) {
      debug!(user = %user, "user not on allow-list");
      return Err(AuthError::NotLoggedIn);
    }

    Ok(())
  }
}
