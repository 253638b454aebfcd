//! Route handlers.
//!
//! [`internal`] serves trusted consumers inside the network boundary;
//! [`portal`] serves owners and requires a bearer token.

pub mod internal;
pub mod portal;

use axum::Json;
use serde_json::{Value, json};

/// `GET …/health`
pub async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }
