//! Caching strategies.
//!
//! Each strategy always produces a response. Network failures, timeouts and
//! cache misses become fallback responses here; they never reach the page
//! as errors.

use crate::selector::StrategyPolicy;
use satchel_client::{Network, Request, Response, StatusCode, Url};
use satchel_core::{CacheDb, CacheEntry, Error, MatchScope, RequestKey, now_iso8601};
use std::sync::Arc;
use std::time::Duration;

/// Value of the `served-by` header on cache fallbacks.
pub const SERVED_BY_CACHE: &str = "ServiceWorker-Cache";
/// Value of the `served-by` header on synthesized offline responses.
pub const SERVED_BY_OFFLINE: &str = "ServiceWorker-Offline";

const OFFLINE_DOCUMENT: &str = "<!DOCTYPE html>
<html lang=\"en\">
<head><meta charset=\"utf-8\"><title>Offline</title></head>
<body>
<h1>You are offline</h1>
<p>The student portal is not reachable right now. Pages you opened before are still available.</p>
</body>
</html>
";

/// 503 JSON answer for an API request with neither network nor cache.
pub fn offline_api_response(url: Url) -> Response {
    let body = serde_json::json!({
        "error": "Network unavailable and no cached data",
        "offline": true,
        "timestamp": now_iso8601(),
    });
    let mut response =
        Response::synthetic(url, StatusCode::SERVICE_UNAVAILABLE, "application/json", body.to_string());
    response.set_header("served-by", SERVED_BY_OFFLINE);
    response
}

/// Built-in document for navigations with neither network nor any cached page.
pub fn offline_document(url: Url) -> Response {
    let mut response =
        Response::synthetic(url, StatusCode::SERVICE_UNAVAILABLE, "text/html; charset=utf-8", OFFLINE_DOCUMENT);
    response.set_header("served-by", SERVED_BY_OFFLINE);
    response
}

pub fn not_found_response(url: Url) -> Response {
    Response::synthetic(url, StatusCode::NOT_FOUND, "text/plain; charset=utf-8", "Not Found")
}

/// A cached entry labeled as a cache fallback.
pub fn annotated_cache_response(url: Url, entry: &CacheEntry) -> Response {
    let mut response = Response::from_entry(url, entry);
    response.set_header("served-by", SERVED_BY_CACHE);
    response.set_header("cache-date", &entry.stored_at);
    response
}

/// Runs strategies against the store and the network.
#[derive(Clone)]
pub struct StrategyRunner {
    store: CacheDb,
    network: Arc<dyn Network>,
    /// Bound on network attempts that have no policy timeout of their own.
    timeout: Duration,
    max_runtime_entries: Option<usize>,
    origin: Url,
}

impl StrategyRunner {
    pub fn new(
        store: CacheDb, network: Arc<dyn Network>, timeout: Duration, max_runtime_entries: Option<usize>, origin: Url,
    ) -> Self {
        Self { store, network, timeout, max_runtime_entries, origin }
    }

    /// Apply `policy` to `request`; `None` means the agent does not intervene.
    pub async fn execute(&self, request: &Request, policy: &StrategyPolicy) -> Option<Response> {
        match policy {
            StrategyPolicy::NetworkFirst { timeout_ms } => {
                Some(self.network_first(request, Duration::from_millis(*timeout_ms)).await)
            }
            StrategyPolicy::CacheFirst => Some(self.cache_first(request).await),
            StrategyPolicy::NavigationFallback { timeout_ms, fallback } => {
                Some(self.navigation_fallback(request, Duration::from_millis(*timeout_ms), fallback).await)
            }
            StrategyPolicy::Passthrough => None,
        }
    }

    /// Race the network against `timeout`; fall back to the labeled cache
    /// entry, then to a 503 offline answer.
    pub async fn network_first(&self, request: &Request, timeout: Duration) -> Response {
        match self.fetch_within(request, timeout).await {
            Ok(response) => {
                if response.ok() {
                    self.store_copy(request, &response).await;
                }
                return response;
            }
            Err(e) => tracing::warn!(url = %request.url, error = %e, "network failed, trying cache"),
        }

        match self.lookup(&request.key()).await {
            Some(entry) => {
                tracing::debug!(url = %request.url, stored_at = %entry.stored_at, "serving cached API response");
                annotated_cache_response(request.url.clone(), &entry)
            }
            None => {
                tracing::warn!(url = %request.url, "no cached API response, answering offline");
                offline_api_response(request.url.clone())
            }
        }
    }

    /// Serve from cache without touching the network; on a miss fetch and store.
    pub async fn cache_first(&self, request: &Request) -> Response {
        if let Some(entry) = self.lookup(&request.key()).await {
            tracing::debug!(url = %request.url, "cache hit");
            return Response::from_entry(request.url.clone(), &entry);
        }

        match self.fetch_within(request, self.timeout).await {
            Ok(response) => {
                if response.ok() {
                    self.store_copy(request, &response).await;
                }
                response
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "static asset unavailable");
                not_found_response(request.url.clone())
            }
        }
    }

    /// Fresh document if the network answers, else the cached page, the
    /// cached offline page, or the built-in offline document.
    pub async fn navigation_fallback(&self, request: &Request, timeout: Duration, fallback: &str) -> Response {
        match self.fetch_within(request, timeout).await {
            Ok(response) => {
                if response.ok() {
                    self.store_copy(request, &response).await;
                }
                return response;
            }
            Err(e) => tracing::warn!(url = %request.url, error = %e, "navigation failed, trying cache"),
        }

        if let Some(entry) = self.lookup(&request.key()).await {
            return Response::from_entry(request.url.clone(), &entry);
        }

        match self.origin.join(fallback) {
            Ok(offline_url) => {
                if let Some(entry) = self.lookup(&RequestKey::get(&offline_url)).await {
                    tracing::debug!(url = %request.url, fallback = %offline_url, "serving cached offline page");
                    return Response::from_entry(request.url.clone(), &entry);
                }
            }
            Err(e) => tracing::warn!(fallback, error = %e, "invalid offline page"),
        }

        offline_document(request.url.clone())
    }

    async fn fetch_within(&self, request: &Request, timeout: Duration) -> Result<Response, Error> {
        match tokio::time::timeout(timeout, self.network.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::FetchTimeout(format!("{} after {:?}", request.url, timeout))),
        }
    }

    /// Current-generation lookup; store errors count as a miss.
    async fn lookup(&self, key: &RequestKey) -> Option<CacheEntry> {
        match self.store.match_request(key, MatchScope::Current).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "cache lookup failed");
                None
            }
        }
    }

    /// Best-effort write into the current generation, then trim it.
    async fn store_copy(&self, request: &Request, response: &Response) {
        if let Err(e) = self.try_store(request, response).await {
            tracing::error!(url = %request.url, error = %e, "cache write failed");
        }
    }

    async fn try_store(&self, request: &Request, response: &Response) -> Result<(), Error> {
        let Some(handle) = self.store.current_handle().await? else {
            tracing::debug!(url = %request.url, "no current generation, not caching");
            return Ok(());
        };
        self.store.put(&handle, &request.key(), &response.snapshot()).await?;

        if let Some(max) = self.max_runtime_entries {
            let evicted = self.store.trim_generation(handle.version(), max).await?;
            if evicted > 0 {
                tracing::debug!(version = %handle.version(), evicted, "trimmed runtime entries");
            }
        }
        Ok(())
    }
}
