//! cache_purge tool implementation.
//!
//! Purges runtime entries of a generation by URL prefix or count, or drops a
//! stale generation entirely. Precached app-shell entries are never purged.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use satchel_core::{CacheDb, CacheVersion, Error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Generation to purge (default: the current one).
    #[serde(default)]
    pub version: Option<String>,

    /// Purge runtime entries whose URL starts with this prefix.
    #[serde(default)]
    pub url_prefix: Option<String>,

    /// Keep only the newest N runtime entries.
    #[serde(default)]
    pub max_entries: Option<usize>,

    /// Delete the whole generation. Refused for the current generation.
    #[serde(default)]
    pub drop_generation: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePurgeOutput {
    pub version: CacheVersion,
    /// Number of entries deleted.
    pub deleted: u64,
    /// True when the generation itself was removed.
    pub generation_dropped: bool,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(cache: &CacheDb, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if params.url_prefix.is_none() && params.max_entries.is_none() && !params.drop_generation {
        return Err(Error::InvalidInput(
            "At least one of url_prefix, max_entries, or drop_generation must be specified".to_string(),
        )
        .into());
    }

    let current = cache.current_generation().await?;
    let version = match params.version {
        Some(version) => cache.handle(&CacheVersion::new(version)).await?.version().clone(),
        None => current.clone().ok_or(Error::NoCurrentGeneration)?,
    };

    if params.drop_generation {
        if current.as_ref() == Some(&version) {
            return Err(Error::InvalidInput(format!("{version} is the current generation")).into());
        }
        let deleted = cache.count_entries(&version).await?;
        let dropped = cache.delete_generation(&version).await?;
        tracing::info!(version = %version, deleted, "dropped generation");
        let output = CachePurgeOutput { version, deleted, generation_dropped: dropped };
        return json_result(&output);
    }

    let mut deleted_total = 0u64;

    if let Some(prefix) = params.url_prefix {
        deleted_total += cache.purge_by_prefix(&version, &prefix).await?;
    }

    if let Some(max_entries) = params.max_entries {
        deleted_total += cache.trim_generation(&version, max_entries).await?;
    }

    let output = CachePurgeOutput { version, deleted: deleted_total, generation_dropped: false };
    json_result(&output)
}
