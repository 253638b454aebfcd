//! [`JwtVerifier`]: the [`TokenVerifier`] used by the owner-facing routes.
//!
//! Signature and registered-claim checks are done by `jsonwebtoken`. This
//! module only decides which key to use and applies the one non-standard
//! check (`org_name`).

use std::{
  collections::HashMap,
  time::{Duration, Instant},
};

use consent_core::guard::{Claims, TokenVerifier, VerificationError};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::settings::{AuthSettings, KeySourceKind, SettingsError};

fn rejected(e: impl std::fmt::Display) -> VerificationError {
  VerificationError::Rejected(e.to_string())
}

fn unavailable(e: impl std::fmt::Display) -> VerificationError {
  VerificationError::Unavailable(e.to_string())
}

// ─── Verifier ────────────────────────────────────────────────────────────────

pub struct JwtVerifier {
  keys:         KeySource,
  validation:   Validation,
  organization: Option<String>,
}

enum KeySource {
  Jwks(JwksCache),
  Secret(DecodingKey),
}

impl JwtVerifier {
  pub fn from_settings(auth: &AuthSettings) -> Result<Self, SettingsError> {
    let (keys, algorithm) = match auth.key_source {
      KeySourceKind::Jwks => {
        let url = auth
          .jwks_url
          .clone()
          .ok_or_else(|| SettingsError::Invalid("auth.jwks_url is required".to_owned()))?;
        let cache = JwksCache::new(
          url,
          Duration::from_secs(auth.http_timeout_secs),
          Duration::from_secs(auth.jwks_refresh_secs),
        )?;
        (KeySource::Jwks(cache), Algorithm::RS256)
      }
      KeySourceKind::Secret => {
        let secret = auth
          .secret
          .as_deref()
          .ok_or_else(|| SettingsError::Invalid("auth.secret is required".to_owned()))?;
        (KeySource::Secret(DecodingKey::from_secret(secret.as_bytes())), Algorithm::HS256)
      }
    };

    let mut validation = Validation::new(algorithm);
    validation.set_required_spec_claims(&["exp", "iss", "aud"]);
    validation.set_issuer(&[auth.issuer.as_str()]);
    validation.set_audience(&[auth.audience.as_str()]);

    Ok(Self { keys, validation, organization: auth.organization.clone() })
  }

  async fn key_for(&self, token: &str) -> Result<DecodingKey, VerificationError> {
    match &self.keys {
      KeySource::Secret(key) => Ok(key.clone()),
      KeySource::Jwks(cache) => {
        let header = decode_header(token).map_err(rejected)?;
        let kid = header.kid.ok_or_else(|| rejected("token has no kid header"))?;
        cache.key(&kid).await
      }
    }
  }
}

impl TokenVerifier for JwtVerifier {
  async fn verify(&self, token: &str) -> Result<Claims, VerificationError> {
    let key = self.key_for(token).await?;
    let claims = decode::<Claims>(token, &key, &self.validation)
      .map_err(rejected)?
      .claims;

    if let Some(expected) = &self.organization {
      match claims.get("org_name").and_then(|v| v.as_str()) {
        Some(org) if org == expected => {}
        other => {
          return Err(rejected(format!(
            "organization mismatch: expected {expected:?}, got {other:?}"
          )));
        }
      }
    }
    Ok(claims)
  }
}

// ─── JWKS cache ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct JwkSet {
  keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
  #[serde(default)]
  kid: Option<String>,
  kty: String,
  #[serde(default)]
  n:   Option<String>,
  #[serde(default)]
  e:   Option<String>,
}

struct CachedKeys {
  keys:       HashMap<String, DecodingKey>,
  fetched_at: Option<Instant>,
}

/// RSA keys by `kid`, refreshed when empty or older than the refresh
/// interval.
struct JwksCache {
  url:     String,
  client:  reqwest::Client,
  refresh: Duration,
  cached:  RwLock<CachedKeys>,
}

impl JwksCache {
  fn new(url: String, timeout: Duration, refresh: Duration) -> Result<Self, SettingsError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| SettingsError::Invalid(format!("failed to build HTTP client: {e}")))?;
    Ok(Self {
      url,
      client,
      refresh,
      cached: RwLock::new(CachedKeys { keys: HashMap::new(), fetched_at: None }),
    })
  }

  fn is_fresh(&self, cached: &CachedKeys) -> bool {
    !cached.keys.is_empty() && cached.fetched_at.is_some_and(|at| at.elapsed() < self.refresh)
  }

  async fn key(&self, kid: &str) -> Result<DecodingKey, VerificationError> {
    {
      let cached = self.cached.read().await;
      if self.is_fresh(&cached)
        && let Some(key) = cached.keys.get(kid)
      {
        return Ok(key.clone());
      }
    }

    let mut cached = self.cached.write().await;
    // Another request may have refreshed while we waited for the lock.
    if !self.is_fresh(&cached) {
      cached.keys = self.fetch().await?;
      cached.fetched_at = Some(Instant::now());
      tracing::info!(keys = cached.keys.len(), url = %self.url, "JWKS refreshed");
    }
    cached
      .keys
      .get(kid)
      .cloned()
      .ok_or_else(|| rejected(format!("no signing key with kid {kid:?}")))
  }

  async fn fetch(&self) -> Result<HashMap<String, DecodingKey>, VerificationError> {
    let response = self.client.get(&self.url).send().await.map_err(unavailable)?;
    if !response.status().is_success() {
      return Err(unavailable(format!("JWKS endpoint returned {}", response.status())));
    }
    let set: JwkSet = response.json().await.map_err(unavailable)?;

    let mut keys = HashMap::new();
    for jwk in set.keys {
      let (Some(kid), "RSA", Some(n), Some(e)) = (jwk.kid, jwk.kty.as_str(), jwk.n, jwk.e) else {
        continue;
      };
      match DecodingKey::from_rsa_components(&n, &e) {
        Ok(key) => {
          keys.insert(kid, key);
        }
        Err(err) => tracing::warn!(%kid, error = %err, "skipping unusable JWKS key"),
      }
    }
    Ok(keys)
  }
}
