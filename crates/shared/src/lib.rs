//! Shared types, error model, configuration, and storage port for SiteWatch.
//!
//! This crate is the foundation depended on by all other SiteWatch crates.
//! It provides:
//! - [`SiteWatchError`] — the unified error type
//! - Domain types ([`WatchUrl`], [`FetchObservation`], [`PageRecord`], [`Subscription`])
//! - The [`WatchStore`] port consumed by the pipeline
//! - Configuration ([`AppConfig`], [`WatcherConfig`], config loading)

pub mod config;
pub mod error;
pub mod store;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, SmtpConfig, StorageSection, TargetEntry, WatcherConfig, WatcherSection, config_dir,
    config_file_path, expand_path, init_config, load_config, load_config_from, smtp_password,
};
pub use error::{Result, SiteWatchError};
pub use store::WatchStore;
pub use types::{FetchObservation, PageRecord, Subscription, WatchTarget, WatchUrl, content_hash};
