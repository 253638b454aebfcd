//! SQLite backend for the consent store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on dedicated worker
//! threads without blocking the async runtime. The "one pending consent per
//! owner and app" rule is a partial unique index, so concurrent creates are
//! decided by SQLite rather than by a read-then-insert.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, StoreConfig};

#[cfg(test)]
mod tests;
