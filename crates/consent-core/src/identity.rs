//! Owner identity resolution: mapping an owner id to the email address the
//! owner authenticates with.

use std::{collections::HashMap, future::Future};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

/// Deployment profile. Test fixtures are only allowed outside production.
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
pub enum Profile {
  Production,
  #[default]
  Development,
  Test,
}

impl Profile {
  pub fn is_production(self) -> bool { matches!(self, Self::Production) }
}

/// Looks up the email address of a data owner.
///
/// Implementations report an unknown owner as [`Error::OwnerNotFound`] and
/// I/O failures as [`Error::Transient`].
pub trait IdentityResolver: Send + Sync {
  fn resolve_email<'a>(
    &'a self,
    owner_id: &'a str,
  ) -> impl Future<Output = Result<String>> + Send + 'a;
}

/// A fixed owner id → email table for development and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityTable {
  entries: HashMap<String, String>,
}

impl StaticIdentityTable {
  /// Build a table; refused under [`Profile::Production`].
  pub fn new(
    profile: Profile,
    entries: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
  ) -> Result<Self> {
    if profile.is_production() {
      return Err(Error::Validation(
        "a static identity table cannot be used in production".to_owned(),
      ));
    }
    let entries: HashMap<String, String> =
      entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
    tracing::warn!(
      entries = entries.len(),
      %profile,
      "using static identity table; owner emails are test fixtures"
    );
    Ok(Self { entries })
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl IdentityResolver for StaticIdentityTable {
  async fn resolve_email(&self, owner_id: &str) -> Result<String> {
    self
      .entries
      .get(owner_id)
      .cloned()
      .ok_or_else(|| Error::OwnerNotFound(owner_id.to_owned()))
  }
}
