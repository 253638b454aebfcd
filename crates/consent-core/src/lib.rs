//! Core types, state machine and engine for the consent service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage, token verification and identity lookup are traits implemented by
//! the outer crates.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod consent;
pub mod duration;
pub mod engine;
pub mod error;
pub mod guard;
pub mod identity;
pub mod lifecycle;
pub mod store;
pub mod view;

pub use engine::ConsentEngine;
pub use error::{Error, Result};
