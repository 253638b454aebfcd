//! [`SqliteStore`]: the SQLite implementation of [`ConsentStore`].

use std::{
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use consent_core::{consent::ConsentRecord, store::ConsentStore};

use crate::{
  Error, Result,
  encode::{RawConsent, encode_dt, encode_uuid},
  schema::{COLUMNS, SCHEMA},
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Connection settings for [`SqliteStore::connect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Database file; `:memory:` opens a private in-memory database.
  pub path:                   PathBuf,
  /// Number of connections, each with its own worker thread.
  pub max_connections:        usize,
  /// How long a connection waits on a locked database before failing.
  pub busy_timeout_ms:        u64,
  /// Upper bound on any single store operation.
  pub query_timeout_ms:       u64,
  pub connect_attempts:       u32,
  pub connect_retry_delay_ms: u64,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      path:                   PathBuf::from("consent-engine.db"),
      max_connections:        25,
      busy_timeout_ms:        5_000,
      query_timeout_ms:       10_000,
      connect_attempts:       5,
      connect_retry_delay_ms: 2_000,
    }
  }
}

impl StoreConfig {
  pub fn in_memory() -> Self { Self { path: PathBuf::from(":memory:"), ..Self::default() } }

  fn is_in_memory(&self) -> bool { self.path.as_os_str() == ":memory:" }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A consent store backed by a single SQLite file.
///
/// Cloning is cheap; all clones share the same connections.
#[derive(Clone)]
pub struct SqliteStore {
  inner: Arc<Inner>,
}

struct Inner {
  conns:         Vec<tokio_rusqlite::Connection>,
  next:          AtomicUsize,
  query_timeout: Duration,
}

/// What happened inside an `update` transaction.
enum UpdateOutcome {
  Missing,
  Rejected(consent_core::Error),
  Applied(ConsentRecord),
}

impl SqliteStore {
  /// Open the configured store, retrying with a fixed delay when the
  /// database cannot be opened.
  pub async fn connect(config: &StoreConfig) -> Result<Self> {
    let attempts = config.connect_attempts.max(1);
    let delay = Duration::from_millis(config.connect_retry_delay_ms);

    let mut attempt = 1;
    loop {
      match Self::open_with(config).await {
        Ok(store) => {
          tracing::info!(
            path = %config.path.display(),
            connections = store.inner.conns.len(),
            "consent store opened"
          );
          return Ok(store);
        }
        Err(e) if attempt < attempts => {
          tracing::warn!(attempt, attempts, error = %e, "failed to open consent store; retrying");
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(e) => {
          return Err(Error::Unavailable { attempts, last: Box::new(e) });
        }
      }
    }
  }

  /// Open (or create) a store at `path` with a single connection.
  pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
    Self::open_with(&StoreConfig { path: path.into(), max_connections: 1, ..StoreConfig::default() })
      .await
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory() -> Result<Self> { Self::open_with(&StoreConfig::in_memory()).await }

  async fn open_with(config: &StoreConfig) -> Result<Self> {
    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);

    // Each in-memory connection would see its own database.
    let count = if config.is_in_memory() { 1 } else { config.max_connections.max(1) };

    let mut conns = Vec::with_capacity(count);
    for i in 0..count {
      let conn = if config.is_in_memory() {
        tokio_rusqlite::Connection::open_in_memory().await?
      } else {
        tokio_rusqlite::Connection::open(&config.path).await?
      };
      let init_schema = i == 0;
      conn
        .call(move |conn| {
          conn.busy_timeout(busy_timeout)?;
          if init_schema {
            conn.execute_batch(SCHEMA)?;
          }
          Ok(())
        })
        .await?;
      conns.push(conn);
    }

    Ok(Self {
      inner: Arc::new(Inner {
        conns,
        next: AtomicUsize::new(0),
        query_timeout: Duration::from_millis(config.query_timeout_ms),
      }),
    })
  }

  fn conn(&self) -> &tokio_rusqlite::Connection {
    let i = self.inner.next.fetch_add(1, Ordering::Relaxed) % self.inner.conns.len();
    &self.inner.conns[i]
  }

  /// Run `f` on the next connection's worker thread, bounded by the query
  /// timeout. A timed-out closure still runs to completion (or rollback) on
  /// its worker; the caller just stops waiting for it.
  async fn call<F, R>(&self, op: &'static str, f: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    match tokio::time::timeout(self.inner.query_timeout, self.conn().call(f)).await {
      Ok(result) => Ok(result?),
      Err(_) => {
        tracing::warn!(op, timeout = ?self.inner.query_timeout, "store operation timed out");
        Err(Error::Timeout(op))
      }
    }
  }

  async fn query_list(
    &self,
    op: &'static str,
    filter: &'static str,
    param: String,
  ) -> Result<Vec<ConsentRecord>> {
    let raws: Vec<RawConsent> = self
      .call(op, move |conn| {
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM consent_records {filter}"))?;
        let rows = stmt
          .query_map(rusqlite::params![param], RawConsent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawConsent::into_record).collect()
  }
}

// ─── ConsentStore impl ───────────────────────────────────────────────────────

impl ConsentStore for SqliteStore {
  type Error = Error;

  async fn put(&self, record: ConsentRecord) -> Result<ConsentRecord> {
    let raw = RawConsent::from_record(&record)?;

    let inserted = self
      .call("put", move |conn| {
        let result = conn.execute(
          &format!(
            "INSERT INTO consent_records ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
          ),
          rusqlite::params![
            raw.consent_id,
            raw.owner_id,
            raw.owner_type,
            raw.owner_email,
            raw.app_id,
            raw.fields,
            raw.purpose,
            raw.session_id,
            raw.redirect_url,
            raw.consent_type,
            raw.status,
            raw.grant_duration,
            raw.created_at,
            raw.updated_at,
            raw.expires_at,
            raw.updated_by,
          ],
        );
        match result {
          Ok(_) => Ok(true),
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
          {
            Ok(false)
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if !inserted {
      tracing::debug!(
        owner_id = %record.owner_id,
        app_id = %record.consumer_app_id,
        "rejected duplicate pending consent"
      );
      return Err(Error::DuplicatePending {
        owner_id: record.owner_id,
        app_id:   record.consumer_app_id,
      });
    }
    Ok(record)
  }

  async fn get(&self, id: Uuid) -> Result<Option<ConsentRecord>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawConsent> = self
      .call("get", move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {COLUMNS} FROM consent_records WHERE consent_id = ?1"),
              rusqlite::params![id_str],
              RawConsent::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawConsent::into_record).transpose()
  }

  async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ConsentRecord>> {
    self
      .query_list(
        "list_by_owner",
        "WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC",
        owner_id.to_owned(),
      )
      .await
  }

  async fn list_by_consumer(&self, app_id: &str) -> Result<Vec<ConsentRecord>> {
    self
      .query_list(
        "list_by_consumer",
        "WHERE app_id = ?1 ORDER BY created_at DESC, rowid DESC",
        app_id.to_owned(),
      )
      .await
  }

  async fn update<F>(&self, id: Uuid, mutate: F) -> Result<ConsentRecord>
  where
    F: FnOnce(ConsentRecord) -> consent_core::Result<ConsentRecord> + Send + 'static,
  {
    let id_str = encode_uuid(id);

    let outcome = self
      .call("update", move |conn| {
        // IMMEDIATE takes the write lock before the read, so no other
        // writer can change the row between our read and our write.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let raw = tx
          .query_row(
            &format!("SELECT {COLUMNS} FROM consent_records WHERE consent_id = ?1"),
            rusqlite::params![id_str],
            RawConsent::from_row,
          )
          .optional()?;
        let Some(raw) = raw else {
          return Ok(UpdateOutcome::Missing);
        };

        let current = match raw.into_record() {
          Ok(record) => record,
          Err(e) => return Ok(UpdateOutcome::Rejected(e.into())),
        };
        let next = match mutate(current.clone()) {
          Ok(next) => next,
          Err(e) => return Ok(UpdateOutcome::Rejected(e)),
        };

        tx.execute(
          "UPDATE consent_records SET status = ?2, updated_at = ?3, updated_by = ?4 \
           WHERE consent_id = ?1",
          rusqlite::params![
            id_str,
            next.status.as_ref(),
            encode_dt(next.updated_at),
            next.updated_by,
          ],
        )?;
        tx.commit()?;

        Ok(UpdateOutcome::Applied(ConsentRecord {
          status: next.status,
          updated_at: next.updated_at,
          updated_by: next.updated_by,
          ..current
        }))
      })
      .await?;

    match outcome {
      UpdateOutcome::Applied(record) => Ok(record),
      UpdateOutcome::Rejected(e) => Err(Error::Core(e)),
      UpdateOutcome::Missing => Err(Error::NotFound(id)),
    }
  }

  async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<ConsentRecord>> {
    self
      .query_list(
        "list_expired_pending",
        "WHERE status = 'pending' AND expires_at <= ?1 ORDER BY expires_at",
        encode_dt(now),
      )
      .await
  }

  async fn list_approved_past_expiry(&self, now: DateTime<Utc>) -> Result<Vec<ConsentRecord>> {
    self
      .query_list(
        "list_approved_past_expiry",
        "WHERE status = 'approved' AND expires_at <= ?1 ORDER BY expires_at",
        encode_dt(now),
      )
      .await
  }
}
