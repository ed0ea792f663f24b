//! Error taxonomy shared by every layer.
//!
//! Validation and authorization failures are produced before any store call;
//! `IncidentNotFound`, `UserNotFound` and the conflict variants are raised by
//! the store as part of the atomic operation itself, so an error never
//! accompanies a partial state change.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// Missing, malformed, or expired credential.
  #[error("unauthenticated: {0}")]
  Unauthenticated(String),

  /// The caller's role is not in the operation's allowed set.
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  /// Malformed or missing input; no mutation was attempted.
  #[error("validation: {0}")]
  Validation(String),

  #[error("incident not found: {0}")]
  IncidentNotFound(Uuid),

  #[error("user not found: {0}")]
  UserNotFound(String),

  /// The voter is already in the incident's significance set.
  #[error("duplicate significance vote by {0}")]
  DuplicateVote(String),

  /// A freshly generated incident id is already present in the store.
  #[error("incident id collision: {0}")]
  IdCollision(Uuid),

  #[error("user already exists: {0}")]
  UserExists(String),

  /// Store or transport failure not attributable to caller input.
  #[error("internal: {0}")]
  Internal(String),
}

impl Error {
  /// Wrap an infrastructure failure (database, serialization, ...).
  pub fn internal<E: std::fmt::Display>(e: E) -> Self {
    Self::Internal(e.to_string())
  }

  /// True for `DuplicateVote`, `IdCollision`, and `UserExists`.
  pub fn is_conflict(&self) -> bool {
    matches!(
      self,
      Self::DuplicateVote(_) | Self::IdCollision(_) | Self::UserExists(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
