//! Unified error types for satchel.
//!
//! Network and cache-miss failures inside fetch strategies are turned into
//! fallback responses before they reach a caller; the variants here surface
//! from store maintenance, lifecycle transitions and the tool surface.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the offline cache agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No cache entry found for the given request key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {}", database_message(.0))]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored response snapshot could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// The named cache generation was never opened.
    #[error("UNKNOWN_GENERATION: {0}")]
    UnknownGeneration(String),

    /// No generation has been activated yet.
    #[error("NO_CURRENT_GENERATION")]
    NoCurrentGeneration,

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Network failure or unusable HTTP response.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// A precache manifest entry could not be fetched; the install is aborted.
    #[error("PRECACHE_FAILED: {url}: {reason}")]
    PrecacheFailed { url: String, reason: String },

    /// Lifecycle transition attempted from the wrong state.
    #[error("INVALID_STATE: {0}")]
    InvalidState(String),

    /// Background sync fired with a tag this agent does not own.
    #[error("UNKNOWN_SYNC_TAG: {0}")]
    UnknownSyncTag(String),

    /// The host platform rejected a request (claim, focus, open window, ...).
    #[error("PLATFORM_ERROR: {0}")]
    Platform(String),
}

/// SQLite's own message, without the connection wrapper.
fn database_message(err: &tokio_rusqlite::Error) -> String {
    match err {
        tokio_rusqlite::Error::Error(e) => e.to_string(),
        other => other.to_string(),
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::FetchTimeout(msg) => (-32006, msg.clone()),
            Error::FetchTooLarge(msg) => (-32007, msg.clone()),
            Error::HttpError(msg) => (-32008, msg.clone()),
            Error::PrecacheFailed { .. } => (-32009, err.to_string()),
            Error::InvalidState(msg) => (-32010, msg.clone()),
            Error::UnknownSyncTag(tag) => (-32011, format!("unknown sync tag: {tag}")),
            Error::Platform(msg) => (-32012, msg.clone()),
            Error::UnknownGeneration(version) => (-32013, format!("unknown cache generation: {version}")),
            Error::NoCurrentGeneration => (-32013, "no cache generation is active".to_string()),
            Error::Database(e) => (-32002, database_message(e)),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::CorruptEntry(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
