//! Owner email lookup for consent creation.

use std::time::Duration;

use consent_core::{
  Error, Result,
  identity::{IdentityResolver, Profile, StaticIdentityTable},
};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::settings::{IdentitySettings, SettingsError};

// ─── Directory ───────────────────────────────────────────────────────────────

/// Looks owners up in an HTTP directory: `GET {base_url}/{owner_id}`
/// answering `{"email": "..."}`.
pub struct DirectoryResolver {
  base_url: url::Url,
  client:   reqwest::Client,
}

#[derive(Deserialize)]
struct DirectoryEntry {
  #[serde(default)]
  email: Option<String>,
}

impl DirectoryResolver {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SettingsError> {
    let base_url = url::Url::parse(base_url)
      .map_err(|e| SettingsError::Invalid(format!("identity.directory_url: {e}")))?;
    if base_url.cannot_be_a_base() {
      return Err(SettingsError::Invalid(format!(
        "identity.directory_url {base_url} cannot carry a path"
      )));
    }
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| SettingsError::Invalid(format!("failed to build HTTP client: {e}")))?;
    Ok(Self { base_url, client })
  }
}

impl DirectoryResolver {
  /// The owner id becomes one percent-encoded path segment.
  fn entry_url(&self, owner_id: &str) -> url::Url {
    let mut url = self.base_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
      segments.pop_if_empty().push(owner_id);
    }
    url
  }
}

impl IdentityResolver for DirectoryResolver {
  async fn resolve_email(&self, owner_id: &str) -> Result<String> {
    let url = self.entry_url(owner_id);

    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| Error::Transient(format!("identity directory: {e}")))?;

    match response.status() {
      StatusCode::NOT_FOUND => return Err(Error::OwnerNotFound(owner_id.to_owned())),
      s if !s.is_success() => {
        return Err(Error::Transient(format!("identity directory returned {s}")));
      }
      _ => {}
    }

    let entry: DirectoryEntry = response
      .json()
      .await
      .map_err(|e| Error::Transient(format!("identity directory: {e}")))?;
    entry
      .email
      .filter(|e| !e.trim().is_empty())
      .ok_or_else(|| Error::OwnerNotFound(owner_id.to_owned()))
  }
}

// ─── Configured resolver ─────────────────────────────────────────────────────

/// The identity resolver selected by configuration.
pub enum Resolver {
  Directory(DirectoryResolver),
  Static(StaticIdentityTable),
  /// Ask the directory first; fall back to the table for owners it does not
  /// know. Only outside production.
  DirectoryWithFallback(DirectoryResolver, StaticIdentityTable),
}

impl Resolver {
  pub fn from_settings(profile: Profile, identity: &IdentitySettings) -> Result<Self, SettingsError> {
    let directory = identity
      .directory_url
      .as_deref()
      .map(|url| DirectoryResolver::new(url, Duration::from_secs(identity.timeout_secs)))
      .transpose()?;

    let table = if identity.static_emails.is_empty() {
      None
    } else {
      Some(
        StaticIdentityTable::new(profile, identity.static_emails.clone())
          .map_err(|e| SettingsError::Invalid(e.to_string()))?,
      )
    };

    match (directory, table) {
      (Some(d), Some(t)) => Ok(Self::DirectoryWithFallback(d, t)),
      (Some(d), None) => Ok(Self::Directory(d)),
      (None, Some(t)) => Ok(Self::Static(t)),
      (None, None) => Err(SettingsError::Invalid("no identity resolver configured".to_owned())),
    }
  }
}

impl IdentityResolver for Resolver {
  async fn resolve_email(&self, owner_id: &str) -> Result<String> {
    match self {
      Self::Directory(d) => d.resolve_email(owner_id).await,
      Self::Static(t) => t.resolve_email(owner_id).await,
      Self::DirectoryWithFallback(d, t) => match d.resolve_email(owner_id).await {
        Err(Error::OwnerNotFound(_)) => t.resolve_email(owner_id).await,
        other => other,
      },
    }
  }
}
