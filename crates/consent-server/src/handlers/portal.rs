//! Handlers for `/api/v1`, used by the consent portal on the owner's behalf.
//!
//! Every route needs `Authorization: Bearer <token>`. A record that does not
//! exist is reported as 404 before ownership is checked.

use axum::{
  Json,
  extract::{
    Path, State,
    rejection::{JsonRejection, PathRejection},
  },
};
use consent_core::{consent::ConsentStatus, store::ConsentStore, view::OwnerView};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, auth::Owner, error::ApiError};

/// `GET /consents/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Owner(caller): Owner,
  id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<OwnerView>, ApiError>
where
  S: ConsentStore + 'static,
{
  let Path(id) = id?;
  Ok(Json(state.engine.get_consent(id, &caller).await?))
}

/// JSON body accepted by `PUT /consents/{id}`.
#[derive(Debug, Deserialize)]
pub struct DecisionBody {
  pub status: ConsentStatus,
  #[serde(default)]
  pub reason: Option<String>,
}

/// `PUT /consents/{id}`: approve, reject or revoke.
pub async fn decide<S>(
  State(state): State<AppState<S>>,
  Owner(caller): Owner,
  id: Result<Path<Uuid>, PathRejection>,
  body: Result<Json<DecisionBody>, JsonRejection>,
) -> Result<Json<OwnerView>, ApiError>
where
  S: ConsentStore + 'static,
{
  let Path(id) = id?;
  let Json(body) = body?;
  let record = state
    .engine
    .transition_consent(id, body.status, &caller, body.reason.as_deref())
    .await?;
  Ok(Json(OwnerView::from(&record)))
}

/// `DELETE /consents/{id}`: shorthand for revoking.
pub async fn revoke<S>(
  State(state): State<AppState<S>>,
  Owner(caller): Owner,
  id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<OwnerView>, ApiError>
where
  S: ConsentStore + 'static,
{
  let Path(id) = id?;
  let record = state
    .engine
    .transition_consent(id, ConsentStatus::Revoked, &caller, None)
    .await?;
  Ok(Json(OwnerView::from(&record)))
}
