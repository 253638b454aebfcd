//! Read-only projections of a consent record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::consent::{ConsentRecord, ConsentStatus, ConsentType};

/// What the consent portal shows an owner. Omits everything the owner does
/// not need to make a decision (session, redirect, audit fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerView {
  pub id:               Uuid,
  pub app_display_name: String,
  pub owner_name:       String,
  pub owner_email:      String,
  pub fields:           Vec<String>,
  pub status:           ConsentStatus,
  #[serde(rename = "type")]
  pub consent_type:     ConsentType,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
  pub expires_at:       DateTime<Utc>,
}

impl From<&ConsentRecord> for OwnerView {
  fn from(r: &ConsentRecord) -> Self {
    Self {
      id:               r.id,
      app_display_name: display_name(&r.consumer_app_id),
      owner_name:       display_name(&r.owner_id),
      owner_email:      r.owner_email.clone(),
      fields:           r.fields.clone(),
      status:           r.status,
      consent_type:     r.consent_type,
      created_at:       r.created_at,
      updated_at:       r.updated_at,
      expires_at:       r.expires_at,
    }
  }
}

/// Just enough to find a record's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerInfo {
  pub owner_id:    String,
  pub owner_email: String,
}

impl From<&ConsentRecord> for OwnerInfo {
  fn from(r: &ConsentRecord) -> Self {
    Self { owner_id: r.owner_id.clone(), owner_email: r.owner_email.clone() }
  }
}

/// Returned to the consumer that created a consent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentResponse {
  pub consent_id:         Uuid,
  pub status:             ConsentStatus,
  /// Where to send the owner; only present while the consent is pending.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub consent_portal_url: Option<String>,
}

impl ConsentResponse {
  pub fn new(record: &ConsentRecord, portal_base_url: &str) -> Self {
    let consent_portal_url = (record.status == ConsentStatus::Pending)
      .then(|| format!("{portal_base_url}?consent_id={}", record.id));
    Self { consent_id: record.id, status: record.status, consent_portal_url }
  }
}

/// `passport-app` → `Passport App`.
pub fn display_name(id: &str) -> String {
  id.split('-')
    .filter(|w| !w.is_empty())
    .map(|word| {
      let mut chars = word.chars();
      match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
      }
    })
    .collect::<Vec<String>>()
    .join(" ")
}
