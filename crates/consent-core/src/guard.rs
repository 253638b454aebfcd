//! Access control for owner-facing operations.
//!
//! The guard turns a bearer token into a [`CallerIdentity`] (authentication)
//! and decides whether that identity may act on a given record
//! (authorization). Signature checking is delegated to a [`TokenVerifier`].

use std::future::Future;

use crate::{Error, Result, consent::ConsentRecord};

/// The verified claim set of a token.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Claims probed for the caller's email, first match wins.
pub const DEFAULT_IDENTITY_CLAIMS: &[&str] = &["email", "sub", "preferred_username"];

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
  /// The token is malformed, expired, badly signed, or fails a claim check.
  #[error("token rejected: {0}")]
  Rejected(String),

  /// Keys could not be obtained (network failure or timeout).
  #[error("verification unavailable: {0}")]
  Unavailable(String),
}

impl From<VerificationError> for Error {
  fn from(e: VerificationError) -> Self {
    match e {
      VerificationError::Rejected(msg) => Self::Unauthenticated(msg),
      VerificationError::Unavailable(msg) => Self::Transient(msg),
    }
  }
}

/// Checks a token's signature and standard claims.
pub trait TokenVerifier: Send + Sync {
  fn verify<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<Claims, VerificationError>> + Send + 'a;
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
  pub email: String,
}

impl CallerIdentity {
  pub fn new(email: impl Into<String>) -> Self { Self { email: email.into() } }

  /// Exact, case-sensitive comparison against the record's owner email.
  pub fn authorize(&self, record: &ConsentRecord) -> Result<()> {
    if record.is_owned_by(&self.email) {
      Ok(())
    } else {
      tracing::warn!(consent_id = %record.id, "caller does not own consent");
      Err(Error::Forbidden(record.id))
    }
  }
}

pub struct OwnerGuard<V> {
  verifier:        V,
  identity_claims: Vec<String>,
}

impl<V: TokenVerifier> OwnerGuard<V> {
  pub fn new(verifier: V) -> Self {
    Self::with_identity_claims(verifier, DEFAULT_IDENTITY_CLAIMS.iter().copied())
  }

  pub fn with_identity_claims(
    verifier: V,
    claims: impl IntoIterator<Item = impl Into<String>>,
  ) -> Self {
    Self {
      verifier,
      identity_claims: claims.into_iter().map(Into::into).collect(),
    }
  }

  pub fn verifier(&self) -> &V { &self.verifier }

  pub async fn authenticate(&self, token: &str) -> Result<CallerIdentity> {
    let token = token.trim();
    if token.is_empty() {
      return Err(Error::Unauthenticated("empty bearer token".to_owned()));
    }
    let claims = self.verifier.verify(token).await?;
    self.identity_from(&claims)
  }

  /// Pick the first configured claim holding a non-blank string. The value is
  /// used verbatim, so padding in a claim never matches an owner email.
  pub fn identity_from(&self, claims: &Claims) -> Result<CallerIdentity> {
    self
      .identity_claims
      .iter()
      .find_map(|name| {
        claims
          .get(name)
          .and_then(|v| v.as_str())
          .filter(|s| !s.trim().is_empty())
      })
      .map(CallerIdentity::new)
      .ok_or_else(|| {
        Error::Unauthenticated(format!(
          "token carries none of the identity claims {:?}",
          self.identity_claims
        ))
      })
  }
}
