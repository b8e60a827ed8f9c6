//! cache_get tool implementation.
//!
//! Looks up the stored response for a request.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use satchel_client::Request;
use satchel_core::{CacheDb, CacheVersion, Error, MatchScope};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ToolError;
use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method of the stored request (default: GET).
    #[serde(default)]
    pub method: Option<String>,

    /// "current" (default) searches the serving generation only; "all" scans every generation.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize)]
pub struct CacheGetOutput {
    pub version: CacheVersion,
    pub method: String,
    pub url: String,
    pub hash: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
    pub body_bytes: usize,
    pub stored_at: String,
    pub precached: bool,
}

fn parse_scope(scope: Option<&str>) -> Result<MatchScope, ToolError> {
    match scope.map(str::trim) {
        None | Some("") | Some("current") => Ok(MatchScope::Current),
        Some("all") => Ok(MatchScope::All),
        Some(other) => Err(ToolError::InvalidInput(format!("scope must be \"current\" or \"all\", got {other:?}"))),
    }
}

/// Implementation of the cache_get tool.
pub async fn get_impl(cache: &CacheDb, origin: &Url, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let scope = parse_scope(params.scope.as_deref())?;
    let method = params.method.as_deref().unwrap_or("GET");
    let key = Request::parse(method, &params.url, Some(origin))?.key();

    let entry = cache
        .match_request(&key, scope)
        .await?
        .ok_or_else(|| Error::CacheMiss(key.to_string()))?;

    let output = CacheGetOutput {
        version: entry.version,
        method: entry.key.method,
        url: entry.key.url,
        hash: entry.key.hash,
        status: entry.response.status,
        headers: entry.response.headers,
        body: String::from_utf8_lossy(&entry.response.body).to_string(),
        body_bytes: entry.response.body.len(),
        stored_at: entry.stored_at,
        precached: entry.precached,
    };

    json_result(&output)
}
