//! Error types for `consent-core`.
//!
//! Every failure an engine operation can produce is one of these variants.
//! Outer layers map each variant to exactly one stable outcome, so callers can
//! tell "wrong credential" from "no such consent" from "already pending"
//! without parsing messages.

use thiserror::Error;
use uuid::Uuid;

use crate::consent::ConsentStatus;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed or missing input; raised before the store is touched.
  #[error("validation failed: {0}")]
  Validation(String),

  /// A pending consent already exists for this owner and application.
  #[error("a pending consent already exists for owner {owner_id:?} and app {app_id:?}")]
  DuplicatePending { owner_id: String, app_id: String },

  #[error("consent not found: {0}")]
  NotFound(Uuid),

  /// The identity directory has no email for this owner.
  #[error("no email on record for owner {0:?}")]
  OwnerNotFound(String),

  #[error("unauthenticated: {0}")]
  Unauthenticated(String),

  #[error("consent {0} belongs to a different owner")]
  Forbidden(Uuid),

  #[error("cannot move consent from {from} to {to}")]
  InvalidTransition { from: ConsentStatus, to: ConsentStatus },

  /// I/O failure or timeout in the store or an external dependency. Safe to
  /// retry.
  #[error("temporarily unavailable: {0}")]
  Transient(String),

  /// Stored data could not be decoded.
  #[error("internal error: {0}")]
  Internal(String),
}

impl Error {
  /// Whether a caller may retry the same operation unchanged.
  pub fn is_transient(&self) -> bool { matches!(self, Self::Transient(_)) }
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self { Self::Internal(e.to_string()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
