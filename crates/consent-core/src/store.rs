//! The `ConsentStore` trait.
//!
//! Implemented by storage backends (e.g. `consent-store-sqlite`). The engine
//! depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::consent::ConsentRecord;

/// Durable home of consent records.
///
/// Two guarantees matter beyond plain persistence:
///
/// - [`put`](ConsentStore::put) is atomic with respect to the "one pending
///   consent per (owner, app)" rule. Of any number of concurrent puts for the
///   same pair, at most one succeeds; the rest fail with a duplicate error.
/// - [`update`](ConsentStore::update) reads, mutates and writes a record as a
///   single serialised step, so two concurrent transitions on one record can
///   never both observe the same starting status.
///
/// All methods return `Send` futures so the trait can be used from a
/// multi-threaded runtime.
pub trait ConsentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  /// Persist a freshly created record.
  fn put(
    &self,
    record: ConsentRecord,
  ) -> impl Future<Output = Result<ConsentRecord, Self::Error>> + Send + '_;

  /// Returns `None` if no record has this id.
  fn get(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ConsentRecord>, Self::Error>> + Send + '_;

  /// Records for one owner, newest first.
  fn list_by_owner<'a>(
    &'a self,
    owner_id: &'a str,
  ) -> impl Future<Output = Result<Vec<ConsentRecord>, Self::Error>> + Send + 'a;

  /// Records for one consumer application, newest first.
  fn list_by_consumer<'a>(
    &'a self,
    app_id: &'a str,
  ) -> impl Future<Output = Result<Vec<ConsentRecord>, Self::Error>> + Send + 'a;

  /// Atomically apply `mutate` to the current version of record `id`.
  ///
  /// Only `status`, `updated_at` and `updated_by` of the returned record are
  /// written. If `mutate` returns an error the record is left untouched and
  /// that error is passed back to the caller.
  fn update<F>(
    &self,
    id: Uuid,
    mutate: F,
  ) -> impl Future<Output = Result<ConsentRecord, Self::Error>> + Send + '_
  where
    F: FnOnce(ConsentRecord) -> crate::Result<ConsentRecord> + Send + 'static;

  /// Pending records whose `expires_at` is at or before `now`.
  fn list_expired_pending(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<ConsentRecord>, Self::Error>> + Send + '_;

  /// Approved records whose `expires_at` is at or before `now`.
  fn list_approved_past_expiry(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<ConsentRecord>, Self::Error>> + Send + '_;
}
