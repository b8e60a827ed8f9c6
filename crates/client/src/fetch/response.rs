//! Responses handed back to the page.

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use satchel_core::{CacheEntry, StoredResponse};
use serde::{Deserialize, Serialize};

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Live from the network.
    Network,
    /// From the cache store.
    Cache,
    /// Synthesized by the agent because neither network nor cache could answer.
    Offline,
}

/// A response as returned by the network or built by the agent.
#[derive(Debug, Clone)]
pub struct Response {
    /// The URL this response answers.
    pub url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body bytes
    pub body: Bytes,
    pub source: ResponseSource,
    /// Time taken to fetch in milliseconds (0 when not from the network)
    pub fetch_ms: u64,
}

impl Response {
    /// A response built by the agent itself.
    pub fn synthetic(url: Url, status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        Self { url, status, headers, body: body.into(), source: ResponseSource::Offline, fetch_ms: 0 }
    }

    /// Rebuild a response from a cache entry.
    ///
    /// Headers that are no longer valid HTTP are skipped.
    pub fn from_entry(url: Url, entry: &CacheEntry) -> Self {
        let stored = &entry.response;
        let mut headers = HeaderMap::new();
        for (name, value) in &stored.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::debug!(header = %name, url = %url, "skipping invalid cached header"),
            }
        }
        let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK);

        Self {
            url,
            status,
            headers,
            body: Bytes::from(stored.body.clone()),
            source: ResponseSource::Cache,
            fetch_ms: 0,
        }
    }

    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// An owned copy suitable for the cache store.
    ///
    /// Non-UTF-8 header values are dropped.
    pub fn snapshot(&self) -> StoredResponse {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        StoredResponse { status: self.status.as_u16(), headers, body: self.body.to_vec() }
    }

    /// First value of header `name` as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or replace a header; invalid values are ignored.
    pub fn set_header(&mut self, name: &'static str, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), value);
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_core::{CacheVersion, RequestKey};

    fn url() -> Url {
        Url::parse("https://portal.test/api/grades").unwrap()
    }

    #[test]
    fn test_synthetic_response() {
        let response = Response::synthetic(url(), StatusCode::SERVICE_UNAVAILABLE, "application/json", "{}");
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(response.source, ResponseSource::Offline);
        assert!(!response.ok());
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut response = Response::synthetic(url(), StatusCode::OK, "application/json", r#"{"a":1}"#);
        let snapshot = response.snapshot();

        response.body = Bytes::from_static(b"changed");
        response.set_header("x-extra", "1");

        assert_eq!(snapshot.body, br#"{"a":1}"#);
        assert_eq!(snapshot.header("x-extra"), None);
        assert_eq!(snapshot.status, 200);
    }

    #[test]
    fn test_from_entry_round_trip_headers() {
        let entry = CacheEntry {
            version: CacheVersion::new("portal-v1.0.0"),
            key: RequestKey::get(&url()),
            response: StoredResponse {
                status: 200,
                headers: vec![("content-type".into(), "application/json".into()), ("bad header".into(), "x".into())],
                body: b"[]".to_vec(),
            },
            stored_at: "2024-05-01T10:00:00.000Z".into(),
            precached: false,
        };

        let response = Response::from_entry(url(), &entry);

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.text(), "[]");
    }

    #[test]
    fn test_set_header_replaces() {
        let mut response = Response::synthetic(url(), StatusCode::OK, "text/plain", "");
        response.set_header("served-by", "a");
        response.set_header("served-by", "b");
        assert_eq!(response.header("served-by"), Some("b"));
    }
}
