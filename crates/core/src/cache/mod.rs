//! SQLite-backed store for versioned cache generations.
//!
//! This module provides the durable request/response cache the offline
//! agent serves from, with async access via tokio-rusqlite. It supports:
//!
//! - One named generation per deployment, exactly one of them current
//! - Request keys hashed with SHA-256 over method and canonical URL
//! - Automatic schema migrations
//! - Atomic precaching and best-effort eviction of stale generations

pub mod connection;
pub mod key;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use key::RequestKey;
pub use store::{CacheEntry, CacheHandle, CacheVersion, DeleteReport, Generation, MatchScope, StoredResponse};
