//! SQL schema for the consent SQLite store.
//!
//! Executed on every connection at startup. Future migrations will be gated
//! on `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Only status, updated_at and updated_by are ever updated.
-- Rows are never deleted.
CREATE TABLE IF NOT EXISTS consent_records (
    consent_id     TEXT PRIMARY KEY,
    owner_id       TEXT NOT NULL,
    owner_type     TEXT NOT NULL DEFAULT 'citizen',
    owner_email    TEXT NOT NULL,
    app_id         TEXT NOT NULL,
    fields         TEXT NOT NULL,   -- JSON array, request order
    purpose        TEXT,
    session_id     TEXT,
    redirect_url   TEXT,
    type           TEXT NOT NULL DEFAULT 'realtime',
    status         TEXT NOT NULL
                   CHECK (status IN ('pending', 'approved', 'rejected', 'expired', 'revoked')),
    grant_duration TEXT NOT NULL,   -- as supplied, e.g. '30d' or 'P30D'
    created_at     TEXT NOT NULL,   -- fixed-width RFC 3339 UTC, microseconds
    updated_at     TEXT NOT NULL,
    expires_at     TEXT NOT NULL,
    updated_by     TEXT
);

-- At most one pending consent per (owner, app). Inserting a second one fails
-- atomically, however many requests race.
CREATE UNIQUE INDEX IF NOT EXISTS consent_records_one_pending_idx
    ON consent_records(owner_id, app_id) WHERE status = 'pending';

CREATE INDEX IF NOT EXISTS consent_records_owner_idx   ON consent_records(owner_id);
CREATE INDEX IF NOT EXISTS consent_records_app_idx     ON consent_records(app_id);
CREATE INDEX IF NOT EXISTS consent_records_status_idx  ON consent_records(status);
CREATE INDEX IF NOT EXISTS consent_records_created_idx ON consent_records(created_at);
CREATE INDEX IF NOT EXISTS consent_records_expires_idx ON consent_records(expires_at);

PRAGMA user_version = 1;
";

/// Column list shared by every `SELECT`, in [`RawConsent`](crate::encode::RawConsent) order.
pub const COLUMNS: &str = "consent_id, owner_id, owner_type, owner_email, app_id, fields, \
                           purpose, session_id, redirect_url, type, status, grant_duration, \
                           created_at, updated_at, expires_at, updated_by";
