//! Error type for `consent-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Raised by a mutator passed to `update`, or by domain validation.
  #[error("core error: {0}")]
  Core(#[from] consent_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored column holds a value the domain types cannot represent.
  #[error("decode error: {0}")]
  Decode(String),

  #[error("a pending consent already exists for owner {owner_id:?} and app {app_id:?}")]
  DuplicatePending { owner_id: String, app_id: String },

  #[error("consent not found: {0}")]
  NotFound(uuid::Uuid),

  #[error("{0} timed out")]
  Timeout(&'static str),

  #[error("could not open store after {attempts} attempts: {last}")]
  Unavailable { attempts: u32, last: Box<Error> },
}

impl From<Error> for consent_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(e) => e,
      Error::DuplicatePending { owner_id, app_id } => Self::DuplicatePending { owner_id, app_id },
      Error::NotFound(id) => Self::NotFound(id),
      Error::Timeout(_) | Error::Database(_) | Error::Unavailable { .. } => {
        Self::Transient(e.to_string())
      }
      Error::Json(_) | Error::Uuid(_) | Error::Decode(_) => Self::Internal(e.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
