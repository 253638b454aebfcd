//! [`ConsentEngine`]: creation, owner transitions, expiry and queries.
//!
//! The engine owns no state of its own. Every call reads through to the
//! store, and every status change goes through [`ConsentStore::update`] so
//! the transition is re-checked against the record as it is at write time.

use chrono::{DateTime, Datelike as _, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  clock::{Clock, SystemClock, new_consent_id},
  consent::{ConsentRecord, ConsentStatus, NewConsent, SYSTEM_ACTOR},
  duration::GrantDuration,
  guard::CallerIdentity,
  identity::IdentityResolver,
  lifecycle::{self, Event},
  store::ConsentStore,
  view::{OwnerInfo, OwnerView},
};

/// Expiry timestamps are stored as fixed-width RFC 3339 text, which only
/// holds four-digit years.
const MAX_EXPIRY_YEAR: i32 = 9999;

pub struct ConsentEngine<S, R, C = SystemClock> {
  store:    S,
  resolver: R,
  clock:    C,
}

impl<S, R> ConsentEngine<S, R, SystemClock> {
  pub fn new(store: S, resolver: R) -> Self { Self::with_clock(store, resolver, SystemClock) }
}

impl<S, R, C> ConsentEngine<S, R, C> {
  pub fn with_clock(store: S, resolver: R, clock: C) -> Self { Self { store, resolver, clock } }

  pub fn store(&self) -> &S { &self.store }
}

impl<S, R, C> ConsentEngine<S, R, C>
where
  S: ConsentStore,
  R: IdentityResolver,
  C: Clock,
{
  pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

  // ─── Creation ────────────────────────────────────────────────────────────

  /// Create a pending consent.
  ///
  /// Fails with [`Error::DuplicatePending`] if the owner already has a
  /// pending consent for this application; the existing record is not
  /// returned.
  pub async fn create_consent(&self, request: NewConsent) -> Result<ConsentRecord> {
    let request = normalize(request)?;
    let grant_duration = GrantDuration::parse_or_default(request.grant_duration.as_deref())?;

    let owner_email = self.resolver.resolve_email(&request.owner_id).await?;

    let now = self.clock.now();
    let expires_at = now
      .checked_add_signed(grant_duration.span())
      .filter(|at| at.year() <= MAX_EXPIRY_YEAR)
      .ok_or_else(|| Error::Validation(format!("grant duration {grant_duration} is too long")))?;

    let record = ConsentRecord {
      id: new_consent_id(),
      owner_id: request.owner_id,
      owner_type: request.owner_type,
      owner_email,
      consumer_app_id: request.consumer_app_id,
      fields: request.fields,
      purpose: request.purpose,
      session_id: request.session_id,
      redirect_url: request.redirect_url,
      consent_type: request.consent_type,
      status: ConsentStatus::Pending,
      grant_duration,
      created_at: now,
      updated_at: now,
      expires_at,
      updated_by: None,
    };

    let record = self.store.put(record).await.map_err(store_err)?;
    tracing::info!(
      consent_id = %record.id,
      owner_id = %record.owner_id,
      app_id = %record.consumer_app_id,
      expires_at = %record.expires_at,
      "consent created"
    );
    Ok(record)
  }

  // ─── Owner-facing ────────────────────────────────────────────────────────

  /// The owner's view of a consent. Existence is checked before ownership.
  pub async fn get_consent(&self, id: Uuid, caller: &CallerIdentity) -> Result<OwnerView> {
    let record = self.get_record(id).await?;
    caller.authorize(&record)?;
    Ok(OwnerView::from(&record))
  }

  /// Move a consent to `target` on behalf of its owner.
  ///
  /// Existence is checked first, then ownership, then the transition itself
  /// inside one atomic store update. A concurrent transition that wins the
  /// race makes this one fail with [`Error::InvalidTransition`] from the
  /// status it left behind.
  pub async fn transition_consent(
    &self,
    id: Uuid,
    target: ConsentStatus,
    caller: &CallerIdentity,
    reason: Option<&str>,
  ) -> Result<ConsentRecord> {
    let record = self.get_record(id).await?;
    caller.authorize(&record)?;

    let actor = caller.email.clone();
    let now = self.clock.now();
    let updated = self
      .store
      .update(id, move |mut current| {
        let event = Event::requested_by_owner(current.status, target)?;
        current.status = lifecycle::transition(current.status, event)?;
        current.updated_at = now;
        current.updated_by = Some(actor);
        Ok(current)
      })
      .await
      .map_err(store_err)?;

    tracing::info!(
      consent_id = %id,
      from = %record.status,
      to = %updated.status,
      reason = reason.unwrap_or(""),
      "consent transitioned by owner"
    );
    Ok(updated)
  }

  // ─── Trusted queries ─────────────────────────────────────────────────────

  pub async fn get_record(&self, id: Uuid) -> Result<ConsentRecord> {
    self
      .store
      .get(id)
      .await
      .map_err(store_err)?
      .ok_or(Error::NotFound(id))
  }

  pub async fn get_owner_info(&self, id: Uuid) -> Result<OwnerInfo> {
    let record = self.get_record(id).await?;
    Ok(OwnerInfo::from(&record))
  }

  pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ConsentRecord>> {
    self.store.list_by_owner(owner_id).await.map_err(store_err)
  }

  pub async fn list_by_consumer(&self, app_id: &str) -> Result<Vec<ConsentRecord>> {
    self.store.list_by_consumer(app_id).await.map_err(store_err)
  }

  // ─── Expiry ──────────────────────────────────────────────────────────────

  /// Expire every pending or approved consent whose `expires_at` is at or
  /// before `now`, returning how many were changed.
  ///
  /// Each candidate is re-checked inside its own atomic update, so records
  /// that changed since they were listed (including ones another sweep
  /// already expired) are skipped. Running the sweep twice with the same
  /// `now` changes nothing the second time.
  pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
    let mut candidates = self.store.list_expired_pending(now).await.map_err(store_err)?;
    candidates
      .extend(self.store.list_approved_past_expiry(now).await.map_err(store_err)?);

    let mut expired = 0;
    for candidate in candidates {
      let outcome = self
        .store
        .update(candidate.id, move |mut current| {
          if !current.is_past_expiry(now) {
            return Err(Error::InvalidTransition {
              from: current.status,
              to:   ConsentStatus::Expired,
            });
          }
          current.status = lifecycle::transition(current.status, Event::Expire)?;
          current.updated_at = now;
          current.updated_by = Some(SYSTEM_ACTOR.to_owned());
          Ok(current)
        })
        .await
        .map_err(store_err);

      match outcome {
        Ok(record) => {
          expired += 1;
          tracing::debug!(consent_id = %record.id, "consent expired");
        }
        Err(Error::InvalidTransition { from, .. }) => {
          tracing::debug!(consent_id = %candidate.id, status = %from, "sweep skipped consent");
        }
        Err(Error::NotFound(_)) => {}
        Err(e) => return Err(e),
      }
    }

    if expired > 0 {
      tracing::info!(count = expired, %now, "expired consents");
    }
    Ok(expired)
  }
}

fn store_err<E: Into<Error>>(e: E) -> Error { e.into() }

// ─── Validation ──────────────────────────────────────────────────────────────

/// Check a creation request and drop blank optional values.
fn normalize(mut request: NewConsent) -> Result<NewConsent> {
  if request.owner_id.trim().is_empty() {
    return Err(Error::Validation("owner_id is required".to_owned()));
  }
  if request.consumer_app_id.trim().is_empty() {
    return Err(Error::Validation("consumer_app_id is required".to_owned()));
  }
  if request.fields.is_empty() {
    return Err(Error::Validation("at least one field is required".to_owned()));
  }
  if request.fields.iter().any(|f| f.trim().is_empty()) {
    return Err(Error::Validation("field names must not be blank".to_owned()));
  }

  let blank_to_none = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
  request.purpose = blank_to_none(request.purpose);
  request.session_id = blank_to_none(request.session_id);
  request.redirect_url = blank_to_none(request.redirect_url);

  if let Some(redirect) = &request.redirect_url {
    let parsed = url::Url::parse(redirect)
      .map_err(|e| Error::Validation(format!("redirect_url {redirect:?}: {e}")))?;
    if !parsed.has_host() {
      return Err(Error::Validation(format!(
        "redirect_url {redirect:?} must be an absolute URL"
      )));
    }
  }

  Ok(request)
}
