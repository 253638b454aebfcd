//! Bearer-token extractor for the owner-facing routes.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use consent_core::{Error as CoreError, guard::CallerIdentity, store::ConsentStore};

use crate::{AppState, error::ApiError};

/// The authenticated owner making the request.
pub struct Owner(pub CallerIdentity);

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
  let value = headers
    .get(AUTHORIZATION)
    .ok_or_else(|| unauthenticated("missing Authorization header"))?
    .to_str()
    .map_err(|_| unauthenticated("Authorization header is not valid ASCII"))?;

  let (scheme, token) = value
    .split_once(' ')
    .ok_or_else(|| unauthenticated("malformed Authorization header"))?;
  if !scheme.eq_ignore_ascii_case("bearer") {
    return Err(unauthenticated("Authorization scheme must be Bearer"));
  }
  Ok(token.trim())
}

fn unauthenticated(msg: &str) -> ApiError {
  ApiError::Core(CoreError::Unauthenticated(msg.to_owned()))
}

impl<S> FromRequestParts<AppState<S>> for Owner
where
  S: ConsentStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let token = bearer_token(&parts.headers)?;
    let caller = state.guard.authenticate(token).await?;
    Ok(Owner(caller))
  }
}
