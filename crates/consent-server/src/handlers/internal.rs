//! Handlers for `/internal/api/v1`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/consents` | Body: [`NewConsent`]; returns 201 + [`ConsentResponse`] |
//! | `GET`  | `/consents/{id}` | Full record |
//! | `GET`  | `/consents/{id}/owner` | [`OwnerInfo`] |
//! | `POST` | `/consents/sweep` | Expire overdue consents now |
//! | `GET`  | `/owners/{owner_id}/consents` | Newest first |
//! | `GET`  | `/consumers/{app_id}/consents` | Newest first |

use axum::{
  Json,
  extract::{
    Path, State,
    rejection::{JsonRejection, PathRejection},
  },
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use consent_core::{
  consent::{ConsentRecord, NewConsent},
  store::ConsentStore,
  view::{ConsentResponse, OwnerInfo},
};
use serde::Serialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /consents`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  body: Result<Json<NewConsent>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ConsentStore + 'static,
{
  let Json(request) = body?;
  let record = state.engine.create_consent(request).await?;
  let response = ConsentResponse::new(&record, &state.config.portal_base_url);
  Ok((StatusCode::CREATED, Json(response)))
}

// ─── Lookups ──────────────────────────────────────────────────────────────────

/// `GET /consents/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ConsentRecord>, ApiError>
where
  S: ConsentStore + 'static,
{
  let Path(id) = id?;
  Ok(Json(state.engine.get_record(id).await?))
}

/// `GET /consents/{id}/owner`
pub async fn owner_info<S>(
  State(state): State<AppState<S>>,
  id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<OwnerInfo>, ApiError>
where
  S: ConsentStore + 'static,
{
  let Path(id) = id?;
  Ok(Json(state.engine.get_owner_info(id).await?))
}

/// `GET /owners/{owner_id}/consents`
pub async fn list_by_owner<S>(
  State(state): State<AppState<S>>,
  Path(owner_id): Path<String>,
) -> Result<Json<Vec<ConsentRecord>>, ApiError>
where
  S: ConsentStore + 'static,
{
  Ok(Json(state.engine.list_by_owner(&owner_id).await?))
}

/// `GET /consumers/{app_id}/consents`
pub async fn list_by_consumer<S>(
  State(state): State<AppState<S>>,
  Path(app_id): Path<String>,
) -> Result<Json<Vec<ConsentRecord>>, ApiError>
where
  S: ConsentStore + 'static,
{
  Ok(Json(state.engine.list_by_consumer(&app_id).await?))
}

// ─── Sweep ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SweepReport {
  pub count:      usize,
  pub checked_at: DateTime<Utc>,
}

/// `POST /consents/sweep`
pub async fn sweep<S>(State(state): State<AppState<S>>) -> Result<Json<SweepReport>, ApiError>
where
  S: ConsentStore + 'static,
{
  let checked_at = state.engine.now();
  let count = state.engine.sweep_expired(checked_at).await?;
  Ok(Json(SweepReport { count, checked_at }))
}
