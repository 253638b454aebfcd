//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with microsecond
//! precision and a `Z` suffix, so comparing them as text compares them as
//! instants. `fields` is a compact JSON array. UUIDs are hyphenated lowercase.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use consent_core::{
  consent::{ConsentRecord, ConsentStatus, ConsentType, OwnerType},
  duration::GrantDuration,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

fn decode_enum<T: FromStr>(column: &str, s: &str) -> Result<T> {
  T::from_str(s).map_err(|_| Error::Decode(format!("unknown {column}: {s:?}")))
}

// ─── Row type ────────────────────────────────────────────────────────────────

/// Raw column values of one `consent_records` row, in
/// [`COLUMNS`](crate::schema::COLUMNS) order.
pub struct RawConsent {
  pub consent_id:     String,
  pub owner_id:       String,
  pub owner_type:     String,
  pub owner_email:    String,
  pub app_id:         String,
  pub fields:         String,
  pub purpose:        Option<String>,
  pub session_id:     Option<String>,
  pub redirect_url:   Option<String>,
  pub consent_type:   String,
  pub status:         String,
  pub grant_duration: String,
  pub created_at:     String,
  pub updated_at:     String,
  pub expires_at:     String,
  pub updated_by:     Option<String>,
}

impl RawConsent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      consent_id:     row.get(0)?,
      owner_id:       row.get(1)?,
      owner_type:     row.get(2)?,
      owner_email:    row.get(3)?,
      app_id:         row.get(4)?,
      fields:         row.get(5)?,
      purpose:        row.get(6)?,
      session_id:     row.get(7)?,
      redirect_url:   row.get(8)?,
      consent_type:   row.get(9)?,
      status:         row.get(10)?,
      grant_duration: row.get(11)?,
      created_at:     row.get(12)?,
      updated_at:     row.get(13)?,
      expires_at:     row.get(14)?,
      updated_by:     row.get(15)?,
    })
  }

  pub fn from_record(r: &ConsentRecord) -> Result<Self> {
    Ok(Self {
      consent_id:     encode_uuid(r.id),
      owner_id:       r.owner_id.clone(),
      owner_type:     r.owner_type.as_ref().to_owned(),
      owner_email:    r.owner_email.clone(),
      app_id:         r.consumer_app_id.clone(),
      fields:         serde_json::to_string(&r.fields)?,
      purpose:        r.purpose.clone(),
      session_id:     r.session_id.clone(),
      redirect_url:   r.redirect_url.clone(),
      consent_type:   r.consent_type.as_ref().to_owned(),
      status:         r.status.as_ref().to_owned(),
      grant_duration: r.grant_duration.as_str().to_owned(),
      created_at:     encode_dt(r.created_at),
      updated_at:     encode_dt(r.updated_at),
      expires_at:     encode_dt(r.expires_at),
      updated_by:     r.updated_by.clone(),
    })
  }

  pub fn into_record(self) -> Result<ConsentRecord> {
    let grant_duration = GrantDuration::parse(&self.grant_duration)
      .map_err(|e| Error::Decode(format!("grant_duration: {e}")))?;

    Ok(ConsentRecord {
      id: decode_uuid(&self.consent_id)?,
      owner_id: self.owner_id,
      owner_type: decode_enum::<OwnerType>("owner_type", &self.owner_type)?,
      owner_email: self.owner_email,
      consumer_app_id: self.app_id,
      fields: serde_json::from_str(&self.fields)?,
      purpose: self.purpose,
      session_id: self.session_id,
      redirect_url: self.redirect_url,
      consent_type: decode_enum::<ConsentType>("type", &self.consent_type)?,
      status: decode_enum::<ConsentStatus>("status", &self.status)?,
      grant_duration,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
      expires_at: decode_dt(&self.expires_at)?,
      updated_by: self.updated_by,
    })
  }
}
