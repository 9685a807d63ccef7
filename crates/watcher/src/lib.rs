//! The SiteWatch core: periodic discovery, a concurrent fetch worker pool,
//! and content-change detection over an append-only history.
//!
//! This crate provides:
//! - [`fetch`] — the injected fetch capability and its HTTP implementation
//! - [`detect`] — the freshness decision folding observations into records
//! - [`pipeline`] — the producer → worker pool → sink wiring and lifecycle

pub mod detect;
pub mod fetch;
pub mod pipeline;

pub use fetch::{Fetch, HttpFetcher};
pub use pipeline::Watcher;
