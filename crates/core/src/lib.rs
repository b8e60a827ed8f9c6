//! Core types and shared functionality for satchel.
//!
//! This crate provides:
//! - Versioned cache store with SQLite backend
//! - Unified error types
//! - Layered worker configuration

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, CacheHandle, CacheVersion, MatchScope, RequestKey, StoredResponse};
pub use config::{ConfigError, NotificationConfig, WorkerConfig};
pub use error::Error;

/// Current time as an ISO 8601 UTC timestamp with millisecond precision.
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
