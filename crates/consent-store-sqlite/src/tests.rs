//! Integration tests for `SqliteStore` and the engine running on top of it.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone as _, Utc};
use consent_core::{
  ConsentEngine, Error as CoreError,
  clock::ManualClock,
  consent::{ConsentRecord, ConsentStatus, ConsentType, NewConsent, OwnerType, SYSTEM_ACTOR},
  duration::GrantDuration,
  guard::CallerIdentity,
  identity::{Profile, StaticIdentityTable},
  store::ConsentStore,
};
use uuid::Uuid;

use crate::{Error, SqliteStore, StoreConfig};

type Engine = ConsentEngine<SqliteStore, StaticIdentityTable, ManualClock>;

const OWNER: &str = "199512345678";
const OWNER_EMAIL: &str = "owner@example.org";
const OTHER: &str = "200012345678";
const OTHER_EMAIL: &str = "other@example.org";

const ALL_STATUSES: [ConsentStatus; 5] = [
  ConsentStatus::Pending,
  ConsentStatus::Approved,
  ConsentStatus::Rejected,
  ConsentStatus::Expired,
  ConsentStatus::Revoked,
];

fn start() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() }

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn engine_on(store: SqliteStore) -> (Engine, ManualClock) {
  let clock = ManualClock::new(start());
  let resolver =
    StaticIdentityTable::new(Profile::Test, [(OWNER, OWNER_EMAIL), (OTHER, OTHER_EMAIL)])
      .expect("static table");
  (ConsentEngine::with_clock(store, resolver, clock.clone()), clock)
}

async fn engine() -> (Engine, ManualClock) { engine_on(store().await) }

fn owner() -> CallerIdentity { CallerIdentity::new(OWNER_EMAIL) }

fn passport_request() -> NewConsent {
  let mut req = NewConsent::new(OWNER, "passport-app", ["person.permanentAddress"]);
  req.grant_duration = Some("30d".into());
  req
}

/// A record written straight to the store, bypassing the engine.
fn record(status: ConsentStatus, app_id: &str) -> ConsentRecord {
  let now = start();
  ConsentRecord {
    id: Uuid::new_v4(),
    owner_id: OWNER.into(),
    owner_type: OwnerType::Citizen,
    owner_email: OWNER_EMAIL.into(),
    consumer_app_id: app_id.into(),
    fields: vec!["person.fullName".into(), "person.birthDate".into()],
    purpose: Some("identity check".into()),
    session_id: Some("sess-1".into()),
    redirect_url: Some("https://app.example.org/done".into()),
    consent_type: ConsentType::Realtime,
    status,
    grant_duration: GrantDuration::parse("1h").unwrap(),
    created_at: now,
    updated_at: now,
    expires_at: now + Duration::hours(1),
    updated_by: None,
  }
}

/// Everything except the three mutable columns.
fn immutable_part(r: &ConsentRecord) -> ConsentRecord {
  ConsentRecord {
    status: ConsentStatus::Pending,
    updated_at: r.created_at,
    updated_by: None,
    ..r.clone()
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_and_get_round_trip() {
  let s = store().await;
  let r = record(ConsentStatus::Pending, "passport-app");

  s.put(r.clone()).await.unwrap();
  let fetched = s.get(r.id).await.unwrap().expect("stored record");
  assert_eq!(fetched, r);
}

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  assert!(s.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn second_pending_for_same_pair_is_rejected() {
  let s = store().await;
  s.put(record(ConsentStatus::Pending, "passport-app")).await.unwrap();

  let err = s.put(record(ConsentStatus::Pending, "passport-app")).await.unwrap_err();
  assert!(matches!(err, Error::DuplicatePending { .. }));

  // Other apps and non-pending rows are unaffected.
  s.put(record(ConsentStatus::Pending, "tax-app")).await.unwrap();
  s.put(record(ConsentStatus::Approved, "passport-app")).await.unwrap();
  s.put(record(ConsentStatus::Revoked, "passport-app")).await.unwrap();
}

#[tokio::test]
async fn update_missing_is_not_found() {
  let s = store().await;
  let id = Uuid::new_v4();
  let err = s.update(id, Ok).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(got) if got == id));
}

#[tokio::test]
async fn update_writes_only_mutable_columns() {
  let s = store().await;
  let r = record(ConsentStatus::Pending, "passport-app");
  s.put(r.clone()).await.unwrap();

  let later = start() + Duration::minutes(5);
  let updated = s
    .update(r.id, move |mut current| {
      current.status = ConsentStatus::Approved;
      current.updated_at = later;
      current.updated_by = Some(OWNER_EMAIL.into());
      current.fields = vec!["person.everything".into()];
      current.expires_at = later + Duration::days(365);
      Ok(current)
    })
    .await
    .unwrap();

  let stored = s.get(r.id).await.unwrap().unwrap();
  assert_eq!(stored, updated);
  assert_eq!(stored.status, ConsentStatus::Approved);
  assert_eq!(stored.fields, r.fields);
  assert_eq!(stored.expires_at, r.expires_at);
}

#[tokio::test]
async fn refused_mutation_leaves_record_untouched() {
  let s = store().await;
  let r = record(ConsentStatus::Pending, "passport-app");
  s.put(r.clone()).await.unwrap();

  let err = s
    .update(r.id, |_| Err(CoreError::Validation("no".into())))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Validation(_))));
  assert_eq!(s.get(r.id).await.unwrap().unwrap(), r);
}

#[tokio::test]
async fn lists_are_newest_first() {
  let s = store().await;
  let mut ids = Vec::new();
  for i in 0..3 {
    let mut r = record(ConsentStatus::Approved, "passport-app");
    r.created_at = start() + Duration::minutes(i);
    ids.push(r.id);
    s.put(r).await.unwrap();
  }
  s.put(record(ConsentStatus::Approved, "tax-app")).await.unwrap();

  let by_app: Vec<Uuid> =
    s.list_by_consumer("passport-app").await.unwrap().iter().map(|r| r.id).collect();
  ids.reverse();
  assert_eq!(by_app, ids);

  assert_eq!(s.list_by_owner(OWNER).await.unwrap().len(), 4);
  assert!(s.list_by_owner(OTHER).await.unwrap().is_empty());
}

#[tokio::test]
async fn sweep_queries_use_inclusive_expiry() {
  let s = store().await;
  let pending = record(ConsentStatus::Pending, "a");
  let approved = record(ConsentStatus::Approved, "b");
  let rejected = record(ConsentStatus::Rejected, "c");
  for r in [&pending, &approved, &rejected] {
    s.put(r.clone()).await.unwrap();
  }

  let before = pending.expires_at - Duration::microseconds(1);
  assert!(s.list_expired_pending(before).await.unwrap().is_empty());
  assert!(s.list_approved_past_expiry(before).await.unwrap().is_empty());

  let at = pending.expires_at;
  let p = s.list_expired_pending(at).await.unwrap();
  let a = s.list_approved_past_expiry(at).await.unwrap();
  assert_eq!(p.iter().map(|r| r.id).collect::<Vec<_>>(), vec![pending.id]);
  assert_eq!(a.iter().map(|r| r.id).collect::<Vec<_>>(), vec![approved.id]);
}

#[tokio::test]
async fn file_store_persists_across_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("consents.db");
  let r = record(ConsentStatus::Pending, "passport-app");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.put(r.clone()).await.unwrap();
  }
  let s = SqliteStore::open(&path).await.unwrap();
  assert_eq!(s.get(r.id).await.unwrap().unwrap(), r);
}

#[tokio::test]
async fn connect_gives_up_after_configured_attempts() {
  let dir = tempfile::tempdir().unwrap();
  let config = StoreConfig {
    path: dir.path().join("missing-dir").join("consents.db"),
    max_connections: 1,
    connect_attempts: 2,
    connect_retry_delay_ms: 1,
    ..StoreConfig::default()
  };
  let err = SqliteStore::connect(&config).await.err().expect("connect should fail");
  assert!(matches!(err, Error::Unavailable { attempts: 2, .. }));
  assert!(CoreError::from(err).is_transient());
}

#[tokio::test]
async fn slow_calls_time_out_as_transient() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("consents.db");
  let config = StoreConfig {
    path: path.clone(),
    max_connections: 1,
    busy_timeout_ms: 5_000,
    query_timeout_ms: 100,
    ..StoreConfig::default()
  };
  let s = SqliteStore::connect(&config).await.unwrap();
  let r = record(ConsentStatus::Pending, "passport-app");
  s.put(r.clone()).await.unwrap();

  // Another writer holds the database lock for longer than the timeout.
  let locker = rusqlite::Connection::open(&path).unwrap();
  locker.execute_batch("BEGIN IMMEDIATE").unwrap();

  let err = s.update(r.id, Ok).await.unwrap_err();
  assert!(matches!(err, Error::Timeout("update")), "{err:?}");
  assert!(CoreError::from(err).is_transient());

  locker.execute_batch("ROLLBACK").unwrap();
}

// ─── Engine: creation ────────────────────────────────────────────────────────

#[tokio::test]
async fn passport_scenario() {
  let (engine, clock) = engine().await;

  let created = engine.create_consent(passport_request()).await.unwrap();
  assert_eq!(created.status, ConsentStatus::Pending);
  assert_eq!(created.owner_email, OWNER_EMAIL);
  assert_eq!(created.fields, vec!["person.permanentAddress".to_owned()]);
  assert_eq!(created.grant_duration.as_str(), "30d");
  assert_eq!(created.created_at, start());
  assert_eq!(created.expires_at, start() + Duration::days(30));

  // A second request while the first is pending is refused.
  let err = engine.create_consent(passport_request()).await.unwrap_err();
  assert!(matches!(err, CoreError::DuplicatePending { .. }));

  clock.advance(Duration::hours(2));
  let approved = engine
    .transition_consent(created.id, ConsentStatus::Approved, &owner(), None)
    .await
    .unwrap();
  assert_eq!(approved.status, ConsentStatus::Approved);
  assert_eq!(approved.updated_at, start() + Duration::hours(2));
  assert_eq!(approved.updated_by.as_deref(), Some(OWNER_EMAIL));
  // Approval does not move the expiry.
  assert_eq!(approved.expires_at, created.expires_at);

  // With the first one approved, a new pending request is allowed.
  engine.create_consent(passport_request()).await.unwrap();

  let view = engine.get_consent(created.id, &owner()).await.unwrap();
  assert_eq!(view.app_display_name, "Passport App");
  assert_eq!(view.status, ConsentStatus::Approved);

  let info = engine.get_owner_info(created.id).await.unwrap();
  assert_eq!(info.owner_id, OWNER);
  assert_eq!(info.owner_email, OWNER_EMAIL);

  // Thirty days on, the approval lapses and can no longer be revoked.
  let lapsed = created.expires_at + Duration::seconds(1);
  assert_eq!(engine.sweep_expired(lapsed).await.unwrap(), 1);
  let expired = engine.get_record(created.id).await.unwrap();
  assert_eq!(expired.status, ConsentStatus::Expired);
  assert_eq!(expired.updated_by.as_deref(), Some(SYSTEM_ACTOR));
  assert!(matches!(
    engine
      .transition_consent(created.id, ConsentStatus::Revoked, &owner(), None)
      .await,
    Err(CoreError::InvalidTransition { from: ConsentStatus::Expired, to: ConsentStatus::Revoked })
  ));
}

#[tokio::test]
async fn expiry_beyond_year_9999_is_refused() {
  let (engine, _) = engine().await;

  let mut req = passport_request();
  req.grant_duration = Some("P10000Y".into());
  assert!(matches!(engine.create_consent(req).await, Err(CoreError::Validation(_))));
  assert!(engine.list_by_owner(OWNER).await.unwrap().is_empty());

  // Long but storable durations still read back and sweep cleanly.
  let mut req = passport_request();
  req.grant_duration = Some("P7000Y".into());
  let created = engine.create_consent(req).await.unwrap();
  assert_eq!(engine.get_record(created.id).await.unwrap(), created);
  assert_eq!(engine.sweep_expired(start() + Duration::days(1)).await.unwrap(), 0);
}

#[tokio::test]
async fn default_grant_duration_is_one_hour() {
  let (engine, _) = engine().await;
  let mut req = passport_request();
  req.grant_duration = None;
  let created = engine.create_consent(req).await.unwrap();
  assert_eq!(created.grant_duration.as_str(), "1h");
  assert_eq!(created.expires_at, created.created_at + Duration::hours(1));
}

#[tokio::test]
async fn unknown_owner_stores_nothing() {
  let (engine, _) = engine().await;
  let req = NewConsent::new("000000000000", "passport-app", ["person.fullName"]);
  let err = engine.create_consent(req).await.unwrap_err();
  assert!(matches!(err, CoreError::OwnerNotFound(_)));
  assert!(engine.list_by_consumer("passport-app").await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_requests_never_reach_the_store() {
  let (engine, _) = engine().await;
  let mut req = passport_request();
  req.grant_duration = Some("30x".into());
  assert!(matches!(engine.create_consent(req).await, Err(CoreError::Validation(_))));

  let mut req = passport_request();
  req.fields.clear();
  assert!(matches!(engine.create_consent(req).await, Err(CoreError::Validation(_))));

  assert!(engine.list_by_owner(OWNER).await.unwrap().is_empty());
}

async fn race_creates(engine: Arc<Engine>, n: usize) {
  let handles: Vec<_> = (0..n)
    .map(|_| {
      let engine = engine.clone();
      tokio::spawn(async move { engine.create_consent(passport_request()).await })
    })
    .collect();

  let mut created = 0;
  let mut duplicates = 0;
  for handle in handles {
    match handle.await.unwrap() {
      Ok(_) => created += 1,
      Err(CoreError::DuplicatePending { .. }) => duplicates += 1,
      Err(e) => panic!("unexpected error: {e}"),
    }
  }
  assert_eq!(created, 1);
  assert_eq!(duplicates, n - 1);

  let pending = engine
    .list_by_owner(OWNER)
    .await
    .unwrap()
    .into_iter()
    .filter(|r| r.status == ConsentStatus::Pending)
    .count();
  assert_eq!(pending, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_yield_one_pending() {
  let (engine, _) = engine().await;
  race_creates(Arc::new(engine), 16).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_across_connections_yield_one_pending() {
  let dir = tempfile::tempdir().unwrap();
  let config = StoreConfig {
    path: dir.path().join("consents.db"),
    max_connections: 4,
    ..StoreConfig::default()
  };
  let (engine, _) = engine_on(SqliteStore::connect(&config).await.unwrap());
  race_creates(Arc::new(engine), 16).await;
}

// ─── Engine: transitions and ownership ───────────────────────────────────────

#[tokio::test]
async fn only_listed_owner_transitions_succeed() {
  let allowed = [
    (ConsentStatus::Pending, ConsentStatus::Approved),
    (ConsentStatus::Pending, ConsentStatus::Rejected),
    (ConsentStatus::Pending, ConsentStatus::Revoked),
    (ConsentStatus::Approved, ConsentStatus::Revoked),
  ];
  let (engine, _) = engine().await;

  for from in ALL_STATUSES {
    for target in ALL_STATUSES {
      let r = record(from, &format!("app-{from}-{target}"));
      engine.store().put(r.clone()).await.unwrap();

      let result = engine.transition_consent(r.id, target, &owner(), None).await;
      if allowed.contains(&(from, target)) {
        assert_eq!(result.unwrap().status, target, "{from} -> {target}");
      } else {
        assert!(
          matches!(result, Err(CoreError::InvalidTransition { from: f, to }) if f == from && to == target),
          "{from} -> {target} should be invalid"
        );
        assert_eq!(engine.get_record(r.id).await.unwrap(), r);
      }
    }
  }
}

#[tokio::test]
async fn other_owners_are_forbidden() {
  let (engine, _) = engine().await;
  let created = engine.create_consent(passport_request()).await.unwrap();
  let intruder = CallerIdentity::new(OTHER_EMAIL);

  assert!(matches!(
    engine.get_consent(created.id, &intruder).await,
    Err(CoreError::Forbidden(id)) if id == created.id
  ));
  assert!(matches!(
    engine
      .transition_consent(created.id, ConsentStatus::Approved, &intruder, None)
      .await,
    Err(CoreError::Forbidden(_))
  ));

  // Email comparison is exact.
  let shouting = CallerIdentity::new(OWNER_EMAIL.to_uppercase());
  assert!(matches!(
    engine.get_consent(created.id, &shouting).await,
    Err(CoreError::Forbidden(_))
  ));
  let padded = CallerIdentity::new(format!(" {OWNER_EMAIL} "));
  assert!(matches!(
    engine.get_consent(created.id, &padded).await,
    Err(CoreError::Forbidden(_))
  ));

  assert_eq!(engine.get_record(created.id).await.unwrap().status, ConsentStatus::Pending);
}

#[tokio::test]
async fn existence_is_checked_before_ownership() {
  let (engine, _) = engine().await;
  let missing = Uuid::new_v4();
  let intruder = CallerIdentity::new(OTHER_EMAIL);

  assert!(matches!(
    engine.get_consent(missing, &intruder).await,
    Err(CoreError::NotFound(id)) if id == missing
  ));
  assert!(matches!(
    engine
      .transition_consent(missing, ConsentStatus::Revoked, &intruder, None)
      .await,
    Err(CoreError::NotFound(_))
  ));
  assert!(matches!(engine.get_owner_info(missing).await, Err(CoreError::NotFound(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_decisions_have_one_winner() {
  let (engine, _) = engine().await;
  let engine = Arc::new(engine);
  let created = engine.create_consent(passport_request()).await.unwrap();

  let handles: Vec<_> = [ConsentStatus::Approved, ConsentStatus::Rejected]
    .into_iter()
    .cycle()
    .take(8)
    .map(|target| {
      let engine = engine.clone();
      tokio::spawn(async move {
        engine.transition_consent(created.id, target, &owner(), None).await
      })
    })
    .collect();

  let mut winners = Vec::new();
  for handle in handles {
    match handle.await.unwrap() {
      Ok(record) => winners.push(record.status),
      Err(CoreError::InvalidTransition { from, .. }) => assert_ne!(from, ConsentStatus::Pending),
      Err(e) => panic!("unexpected error: {e}"),
    }
  }
  assert_eq!(winners.len(), 1);
  assert_eq!(engine.get_record(created.id).await.unwrap().status, winners[0]);
}

#[tokio::test]
async fn transitions_never_touch_immutable_fields() {
  let (engine, clock) = engine().await;
  let mut req = passport_request();
  req.purpose = Some("passport renewal".into());
  req.session_id = Some("session-42".into());
  req.redirect_url = Some("https://passport.example.org/return".into());
  req.consent_type = ConsentType::Offline;
  let created = engine.create_consent(req).await.unwrap();

  clock.advance(Duration::minutes(1));
  engine
    .transition_consent(created.id, ConsentStatus::Approved, &owner(), Some("fine"))
    .await
    .unwrap();
  clock.advance(Duration::minutes(1));
  let revoked = engine
    .transition_consent(created.id, ConsentStatus::Revoked, &owner(), None)
    .await
    .unwrap();

  assert_eq!(immutable_part(&revoked), immutable_part(&created));
  assert_eq!(revoked.updated_at, start() + Duration::minutes(2));
}

// ─── Engine: expiry sweep ────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_expires_stale_pending_and_approved() {
  let (engine, clock) = engine().await;

  let mut short = NewConsent::new(OWNER, "short-app", ["person.fullName"]);
  short.grant_duration = Some("1h".into());
  let pending = engine.create_consent(short.clone()).await.unwrap();

  short.consumer_app_id = "approved-app".into();
  let approved = engine.create_consent(short).await.unwrap();
  engine
    .transition_consent(approved.id, ConsentStatus::Approved, &owner(), None)
    .await
    .unwrap();

  let rejected = engine
    .create_consent(NewConsent::new(OWNER, "rejected-app", ["person.fullName"]))
    .await
    .unwrap();
  engine
    .transition_consent(rejected.id, ConsentStatus::Rejected, &owner(), None)
    .await
    .unwrap();

  let long = engine.create_consent(passport_request()).await.unwrap();

  // Nothing is due yet.
  assert_eq!(engine.sweep_expired(start() + Duration::minutes(59)).await.unwrap(), 0);

  clock.advance(Duration::hours(2));
  let now = engine.now();
  assert_eq!(engine.sweep_expired(now).await.unwrap(), 2);

  for id in [pending.id, approved.id] {
    let r = engine.get_record(id).await.unwrap();
    assert_eq!(r.status, ConsentStatus::Expired);
    assert_eq!(r.updated_by.as_deref(), Some(SYSTEM_ACTOR));
    assert_eq!(r.updated_at, now);
  }
  assert_eq!(engine.get_record(rejected.id).await.unwrap().status, ConsentStatus::Rejected);
  assert_eq!(engine.get_record(long.id).await.unwrap().status, ConsentStatus::Pending);
}

#[tokio::test]
async fn sweep_is_idempotent() {
  let (engine, _) = engine().await;
  let created = engine
    .create_consent(NewConsent::new(OWNER, "passport-app", ["person.fullName"]))
    .await
    .unwrap();

  let later = start() + Duration::hours(3);
  assert_eq!(engine.sweep_expired(later).await.unwrap(), 1);
  let after_first = engine.get_record(created.id).await.unwrap();

  assert_eq!(engine.sweep_expired(later).await.unwrap(), 0);
  assert_eq!(engine.get_record(created.id).await.unwrap(), after_first);

  // Expiry frees the slot for a new pending request.
  engine
    .create_consent(NewConsent::new(OWNER, "passport-app", ["person.fullName"]))
    .await
    .unwrap();
}

#[tokio::test]
async fn expired_consents_cannot_be_approved() {
  let (engine, _) = engine().await;
  let created = engine
    .create_consent(NewConsent::new(OWNER, "passport-app", ["person.fullName"]))
    .await
    .unwrap();
  engine.sweep_expired(start() + Duration::hours(1)).await.unwrap();

  assert!(matches!(
    engine
      .transition_consent(created.id, ConsentStatus::Approved, &owner(), None)
      .await,
    Err(CoreError::InvalidTransition { from: ConsentStatus::Expired, to: ConsentStatus::Approved })
  ));
}
