//! Runtime configuration, loaded once at startup.
//!
//! Sources, later ones winning:
//!
//! 1. built-in defaults
//! 2. an optional TOML file (`consent-engine.toml` unless `--config` says otherwise)
//! 3. environment variables, e.g. `CONSENT__STORE__PATH=/var/lib/consents.db`;
//!    `CONSENT__AUTH__IDENTITY_CLAIMS` takes a comma-separated list

use std::{collections::BTreeMap, path::Path};

use consent_core::{guard::DEFAULT_IDENTITY_CLAIMS, identity::Profile};
use consent_store_sqlite::StoreConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
  #[error("failed to load configuration: {0}")]
  Load(#[from] config::ConfigError),

  #[error("invalid configuration: {0}")]
  Invalid(String),
}

fn invalid(msg: impl Into<String>) -> SettingsError { SettingsError::Invalid(msg.into()) }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub profile:             Profile,
  pub host:                String,
  pub port:                u16,
  /// Owners are sent to `{portal_base_url}?consent_id={id}`.
  pub portal_base_url:     String,
  /// Seconds between background expiry sweeps; `0` disables them.
  pub sweep_interval_secs: u64,
  pub store:               StoreConfig,
  pub auth:                AuthSettings,
  pub identity:            IdentitySettings,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      profile:             Profile::Development,
      host:                "0.0.0.0".to_owned(),
      port:                8081,
      portal_base_url:     "http://localhost:5173".to_owned(),
      sweep_interval_secs: 60,
      store:               StoreConfig::default(),
      auth:                AuthSettings::default(),
      identity:            IdentitySettings::default(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySourceKind {
  /// RS256 keys fetched from the identity provider's JWKS endpoint.
  Jwks,
  /// A shared HS256 secret. Not allowed in production.
  Secret,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
  pub key_source:        KeySourceKind,
  pub jwks_url:          Option<String>,
  pub secret:            Option<String>,
  pub issuer:            String,
  pub audience:          String,
  /// When set, tokens must carry a matching `org_name` claim.
  pub organization:      Option<String>,
  /// Claims probed, in order, for the caller's email.
  pub identity_claims:   Vec<String>,
  pub jwks_refresh_secs: u64,
  pub http_timeout_secs: u64,
}

impl Default for AuthSettings {
  fn default() -> Self {
    Self {
      key_source:        KeySourceKind::Jwks,
      jwks_url:          None,
      secret:            None,
      issuer:            String::new(),
      audience:          String::new(),
      organization:      None,
      identity_claims:   DEFAULT_IDENTITY_CLAIMS.iter().map(|c| (*c).to_owned()).collect(),
      jwks_refresh_secs: 3600,
      http_timeout_secs: 10,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
  /// Directory queried as `GET {directory_url}/{owner_id}`.
  pub directory_url: Option<String>,
  pub timeout_secs:  u64,
  /// Owner id → email fixtures. Refused in production.
  pub static_emails: BTreeMap<String, String>,
}

impl Default for IdentitySettings {
  fn default() -> Self {
    Self { directory_url: None, timeout_secs: 10, static_emails: BTreeMap::new() }
  }
}

impl Settings {
  /// Load from `path` (if it exists) and the environment, then validate.
  pub fn load(path: &Path) -> Result<Self, SettingsError> { Self::load_with(path, environment()) }

  fn load_with(path: &Path, env: config::Environment) -> Result<Self, SettingsError> {
    let settings: Settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(env)
      .build()?
      .try_deserialize()?;
    settings.validate()?;
    Ok(settings)
  }

  pub fn validate(&self) -> Result<(), SettingsError> {
    require_absolute_url("portal_base_url", &self.portal_base_url)?;

    if self.store.max_connections == 0 {
      return Err(invalid("store.max_connections must be at least 1"));
    }
    if self.auth.identity_claims.is_empty() {
      return Err(invalid("auth.identity_claims must name at least one claim"));
    }
    if self.auth.issuer.trim().is_empty() || self.auth.audience.trim().is_empty() {
      return Err(invalid("auth.issuer and auth.audience are required"));
    }

    match self.auth.key_source {
      KeySourceKind::Jwks => {
        let url = self
          .auth
          .jwks_url
          .as_deref()
          .ok_or_else(|| invalid("auth.jwks_url is required for the jwks key source"))?;
        require_absolute_url("auth.jwks_url", url)?;
      }
      KeySourceKind::Secret => {
        if self.profile.is_production() {
          return Err(invalid("the secret key source cannot be used in production"));
        }
        if self.auth.secret.as_deref().is_none_or(|s| s.is_empty()) {
          return Err(invalid("auth.secret is required for the secret key source"));
        }
      }
    }

    if let Some(url) = &self.identity.directory_url {
      require_absolute_url("identity.directory_url", url)?;
    }
    if !self.identity.static_emails.is_empty() && self.profile.is_production() {
      return Err(invalid("identity.static_emails cannot be used in production"));
    }
    if self.identity.directory_url.is_none() && self.identity.static_emails.is_empty() {
      return Err(invalid(
        "configure identity.directory_url or, outside production, identity.static_emails",
      ));
    }

    Ok(())
  }

  pub fn bind_address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// A copy safe to print: secrets are masked.
  pub fn redacted(&self) -> Self {
    let mut copy = self.clone();
    if copy.auth.secret.is_some() {
      copy.auth.secret = Some("********".to_owned());
    }
    copy
  }
}

fn environment() -> config::Environment {
  config::Environment::with_prefix("CONSENT")
    .prefix_separator("__")
    .separator("__")
    .try_parsing(true)
    .list_separator(",")
    .with_list_parse_key("auth.identity_claims")
}

fn require_absolute_url(name: &str, value: &str) -> Result<(), SettingsError> {
  match url::Url::parse(value) {
    Ok(url) if url.has_host() => Ok(()),
    Ok(_) => Err(invalid(format!("{name} must be an absolute URL, got {value:?}"))),
    Err(e) => Err(invalid(format!("{name} {value:?}: {e}"))),
  }
}
