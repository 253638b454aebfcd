//! HTTP surface of the consent engine.
//!
//! Exposes an axum [`Router`] with two route groups over one
//! [`ConsentEngine`]:
//!
//! - `/internal/api/v1/…` for consumer applications (no auth; keep it behind
//!   the network boundary)
//! - `/api/v1/…` for the consent portal, authenticated with a bearer token

pub mod auth;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod jwks;
pub mod settings;
pub mod sweep;

pub use error::ApiError;
pub use settings::Settings;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use consent_core::{ConsentEngine, guard::OwnerGuard, store::ConsentStore};
use tower_http::trace::TraceLayer;

use directory::Resolver;
use handlers::{health, internal, portal};
use jwks::JwtVerifier;

/// The engine as the server runs it.
pub type Engine<S> = ConsentEngine<S, Resolver>;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub engine: Arc<Engine<S>>,
  pub guard:  Arc<OwnerGuard<JwtVerifier>>,
  pub config: Arc<Settings>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      engine: self.engine.clone(),
      guard:  self.guard.clone(),
      config: self.config.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

pub fn router<S>(state: AppState<S>) -> Router
where
  S: ConsentStore + 'static,
{
  let internal = Router::new()
    .route("/health", get(health))
    .route("/consents", post(internal::create::<S>))
    .route("/consents/sweep", post(internal::sweep::<S>))
    .route("/consents/{id}", get(internal::get_one::<S>))
    .route("/consents/{id}/owner", get(internal::owner_info::<S>))
    .route("/owners/{owner_id}/consents", get(internal::list_by_owner::<S>))
    .route("/consumers/{app_id}/consents", get(internal::list_by_consumer::<S>));

  let portal = Router::new().route("/health", get(health)).route(
    "/consents/{id}",
    get(portal::get_one::<S>)
      .put(portal::decide::<S>)
      .delete(portal::revoke::<S>),
  );

  Router::new()
    .nest("/internal/api/v1", internal)
    .nest("/api/v1", portal)
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
