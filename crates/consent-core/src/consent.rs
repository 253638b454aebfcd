//! The consent record and its enumerations.
//!
//! A consent record gates whether one consumer application may read a fixed
//! set of one data owner's fields. Apart from its status and the audit pair
//! (`updated_at`, `updated_by`), a record never changes after it is created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::duration::GrantDuration;

/// Actor recorded in `updated_by` for transitions made by the expiry sweep.
pub const SYSTEM_ACTOR: &str = "system";

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumIter,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConsentStatus {
  Pending,
  Approved,
  Rejected,
  Expired,
  Revoked,
}

impl ConsentStatus {
  /// No transition leaves a terminal status.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Rejected | Self::Expired | Self::Revoked)
  }
}

/// How the owner is asked: interactively while the consumer waits, or
/// asynchronously.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConsentType {
  #[default]
  Realtime,
  Offline,
}

/// The kind of data owner a consent is about.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OwnerType {
  #[default]
  Citizen,
}

// ─── Record ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
  pub id:              Uuid,
  pub owner_id:        String,
  pub owner_type:      OwnerType,
  /// Resolved from `owner_id` at creation time; never refreshed.
  pub owner_email:     String,
  pub consumer_app_id: String,
  /// Requested data-field identifiers, in request order.
  pub fields:          Vec<String>,
  pub purpose:         Option<String>,
  pub session_id:      Option<String>,
  pub redirect_url:    Option<String>,
  pub consent_type:    ConsentType,
  pub status:          ConsentStatus,
  pub grant_duration:  GrantDuration,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
  /// `created_at + grant_duration`, fixed at creation.
  pub expires_at:      DateTime<Utc>,
  pub updated_by:      Option<String>,
}

impl ConsentRecord {
  pub fn is_owned_by(&self, email: &str) -> bool { self.owner_email == email }

  /// Whether the record is past its expiry at `now`.
  pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool { self.expires_at <= now }
}

// ─── Input ───────────────────────────────────────────────────────────────────

/// A consumer-initiated request for consent. Everything the engine does not
/// compute itself (id, email, timestamps, status) comes from here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewConsent {
  pub owner_id:        String,
  #[serde(default)]
  pub owner_type:      OwnerType,
  pub consumer_app_id: String,
  pub fields:          Vec<String>,
  #[serde(default)]
  pub purpose:         Option<String>,
  #[serde(default)]
  pub session_id:      Option<String>,
  #[serde(default)]
  pub redirect_url:    Option<String>,
  #[serde(default)]
  pub consent_type:    ConsentType,
  /// Short (`30d`) or ISO 8601 (`P30D`) form; absent means one hour.
  #[serde(default)]
  pub grant_duration:  Option<String>,
}

impl NewConsent {
  pub fn new(
    owner_id: impl Into<String>,
    consumer_app_id: impl Into<String>,
    fields: impl IntoIterator<Item = impl Into<String>>,
  ) -> Self {
    Self {
      owner_id: owner_id.into(),
      consumer_app_id: consumer_app_id.into(),
      fields: fields.into_iter().map(Into::into).collect(),
      ..Self::default()
    }
  }
}
