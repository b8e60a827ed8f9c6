//! Background sync for the grades and notifications data domains.
//!
//! A sync re-fetches one API resource, stores it in the current generation and
//! tells every open client. Retry scheduling belongs to the host; a failed
//! sync is reported once and not retried here.

use crate::platform::Platform;
use satchel_client::{Network, Request, Url};
use satchel_core::{CacheDb, Error, now_iso8601};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// A background-sync tag owned by this agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncTag {
    #[serde(rename = "background-sync-grades")]
    Grades,
    #[serde(rename = "background-sync-notifications")]
    Notifications,
}

impl SyncTag {
    pub const ALL: [SyncTag; 2] = [SyncTag::Grades, SyncTag::Notifications];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTag::Grades => "background-sync-grades",
            SyncTag::Notifications => "background-sync-notifications",
        }
    }

    /// API resource re-fetched when the tag fires.
    pub fn resource_path(&self) -> &'static str {
        match self {
            SyncTag::Grades => "/api/grades",
            SyncTag::Notifications => "/api/notifications",
        }
    }

    /// `type` of the message broadcast after a successful sync.
    pub fn message_type(&self) -> &'static str {
        match self {
            SyncTag::Grades => "GRADES_SYNCED",
            SyncTag::Notifications => "NOTIFICATIONS_SYNCED",
        }
    }
}

impl FromStr for SyncTag {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        SyncTag::ALL
            .into_iter()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| Error::UnknownSyncTag(tag.to_string()))
    }
}

impl std::fmt::Display for SyncTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message posted to clients, e.g. `{"type": "GRADES_SYNCED", "timestamp": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
}

impl ClientMessage {
    pub fn now(kind: &str) -> Self {
        Self { kind: kind.to_string(), timestamp: now_iso8601() }
    }
}

/// Result of delivering one message to every open client.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Broadcast {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Post `message` to every open client; one failed delivery does not stop the others.
pub async fn broadcast(platform: &dyn Platform, message: &ClientMessage) -> Result<Broadcast, Error> {
    let value = serde_json::to_value(message).map_err(|e| Error::InvalidInput(e.to_string()))?;
    let mut report = Broadcast::default();

    for client in platform.clients().await? {
        match platform.post_message(&client.id, &value).await {
            Ok(()) => report.delivered.push(client.id),
            Err(e) => {
                tracing::warn!(client = %client.id, error = %e, "message delivery failed");
                report.failed.push((client.id, e.to_string()));
            }
        }
    }

    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub tag: SyncTag,
    pub url: String,
    pub status: u16,
    pub message: ClientMessage,
    pub broadcast: Broadcast,
}

/// Runs background syncs against the current generation.
#[derive(Debug, Clone)]
pub struct SyncAgent {
    origin: Url,
    timeout: Duration,
    max_runtime_entries: Option<usize>,
}

impl SyncAgent {
    pub fn new(origin: Url, timeout: Duration, max_runtime_entries: Option<usize>) -> Self {
        Self { origin, timeout, max_runtime_entries }
    }

    /// Fire the sync for `tag`.
    ///
    /// Fails without broadcasting if the tag is unknown, no generation is
    /// current, or the resource can't be fetched with a 2xx answer.
    ///
    /// The target generation is resolved after the fetch: an activation may
    /// have replaced the current generation while the request was in flight.
    pub async fn run(
        &self, tag: &str, store: &CacheDb, network: &dyn Network, platform: &dyn Platform,
    ) -> Result<SyncReport, Error> {
        let tag: SyncTag = tag.parse()?;
        store.current_generation().await?.ok_or(Error::NoCurrentGeneration)?;

        let url = self
            .origin
            .join(tag.resource_path())
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", tag.resource_path())))?;
        let request = Request::get(url);

        let response = tokio::time::timeout(self.timeout, network.fetch(&request))
            .await
            .map_err(|_| Error::FetchTimeout(format!("{} after {:?}", request.url, self.timeout)))??;
        if !response.ok() {
            return Err(Error::HttpError(format!("{} answered {}", request.url, response.status.as_u16())));
        }

        let handle = store.current_handle().await?.ok_or(Error::NoCurrentGeneration)?;
        store.put(&handle, &request.key(), &response.snapshot()).await?;
        tracing::info!(tag = %tag, version = %handle.version(), "background sync stored fresh data");

        if let Some(max) = self.max_runtime_entries {
            let evicted = store.trim_generation(handle.version(), max).await?;
            if evicted > 0 {
                tracing::debug!(version = %handle.version(), evicted, "trimmed runtime entries");
            }
        }

        let message = ClientMessage::now(tag.message_type());
        let broadcast = broadcast(platform, &message).await?;

        Ok(SyncReport { tag, url: request.url.to_string(), status: response.status.as_u16(), message, broadcast })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InMemoryPlatform;
    use crate::testing::{ORIGIN, StubNetwork, store_with_current, url};
    use async_trait::async_trait;
    use satchel_client::{Response, StatusCode};
    use satchel_core::{CacheVersion, MatchScope, RequestKey};

    fn agent() -> SyncAgent {
        SyncAgent::new(Url::parse(ORIGIN).unwrap(), Duration::from_millis(200), None)
    }

    /// Activates `next` (promote, then drop every other generation) while the
    /// request is in flight, then answers 200.
    struct UpgradeDuringFetch {
        store: CacheDb,
        next: CacheVersion,
    }

    #[async_trait]
    impl Network for UpgradeDuringFetch {
        async fn fetch(&self, request: &Request) -> Result<Response, Error> {
            self.store.open_generation(&self.next).await?;
            self.store.promote(&self.next).await?;
            self.store.delete_all_except(&self.next).await?;
            Ok(Response::synthetic(request.url.clone(), StatusCode::OK, "application/json", r#"{"grades":[]}"#))
        }
    }

    #[test]
    fn test_tag_parse() {
        assert_eq!("background-sync-grades".parse::<SyncTag>().unwrap(), SyncTag::Grades);
        assert_eq!(SyncTag::Notifications.resource_path(), "/api/notifications");
        assert!(matches!("background-sync-timetable".parse::<SyncTag>(), Err(Error::UnknownSyncTag(_))));
    }

    #[test]
    fn test_client_message_shape() {
        let message = ClientMessage::now("GRADES_SYNCED");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "GRADES_SYNCED");
        assert!(chrono::DateTime::parse_from_rfc3339(value["timestamp"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_grades_sync_updates_cache_and_notifies_clients() {
        let store = store_with_current("student-portal-v1.0.0").await;
        let network = StubNetwork::new();
        network.json(url("/api/grades").as_str(), r#"[{"subject":"Physics","grade":"B+"}]"#);
        let platform = InMemoryPlatform::new();
        let a = platform.add_client("http://localhost:3000/").await;
        let b = platform.add_client("http://localhost:3000/grades").await;

        let report = agent().run("background-sync-grades", &store, &network, &platform).await.unwrap();

        let entry = store.match_request(&RequestKey::get(&url("/api/grades")), MatchScope::Current).await.unwrap();
        assert_eq!(entry.unwrap().response.body, br#"[{"subject":"Physics","grade":"B+"}]"#);

        let messages = platform.snapshot().await.messages;
        assert_eq!(messages.len(), 2);
        let recipients: Vec<&str> = messages.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(recipients, vec![a.id.as_str(), b.id.as_str()]);
        for (_, message) in &messages {
            assert_eq!(message["type"], "GRADES_SYNCED");
            assert!(message["timestamp"].is_string());
        }
        assert_eq!(report.broadcast.delivered.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_client_does_not_stop_broadcast() {
        let store = store_with_current("student-portal-v1.0.0").await;
        let network = StubNetwork::new();
        network.json(url("/api/notifications").as_str(), "[]");
        let platform = InMemoryPlatform::new();
        let gone = platform.add_client("http://localhost:3000/").await;
        let live = platform.add_client("http://localhost:3000/notifications").await;
        platform.set_unreachable(&gone.id).await;

        let report = agent().run("background-sync-notifications", &store, &network, &platform).await.unwrap();

        assert_eq!(report.broadcast.delivered, vec![live.id]);
        assert_eq!(report.broadcast.failed.len(), 1);
        assert_eq!(report.message.kind, "NOTIFICATIONS_SYNCED");
    }

    #[tokio::test]
    async fn test_failed_sync_does_not_broadcast() {
        let store = store_with_current("student-portal-v1.0.0").await;
        let network = StubNetwork::new();
        network.fail(url("/api/grades").as_str());
        let platform = InMemoryPlatform::new();
        platform.add_client("http://localhost:3000/").await;

        let result = agent().run("background-sync-grades", &store, &network, &platform).await;

        assert!(matches!(result, Err(Error::HttpError(_))));
        assert!(platform.snapshot().await.messages.is_empty());
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_success_sync_not_stored() {
        let store = store_with_current("student-portal-v1.0.0").await;
        let network = StubNetwork::new();
        network.respond(url("/api/grades").as_str(), 502, "text/plain", "bad gateway");
        let platform = InMemoryPlatform::new();

        let result = agent().run("background-sync-grades", &store, &network, &platform).await;

        assert!(result.is_err());
        let entry = store.match_request(&RequestKey::get(&url("/api/grades")), MatchScope::Current).await.unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn test_sync_requires_current_generation() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let network = StubNetwork::new();
        let platform = InMemoryPlatform::new();

        let result = agent().run("background-sync-grades", &store, &network, &platform).await;

        assert!(matches!(result, Err(Error::NoCurrentGeneration)));
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_tag() {
        let store = store_with_current("student-portal-v1.0.0").await;
        let network = StubNetwork::new();
        let platform = InMemoryPlatform::new();

        let result = agent().run("background-sync-timetable", &store, &network, &platform).await;

        assert!(matches!(result, Err(Error::UnknownSyncTag(_))));
    }

    #[tokio::test]
    async fn test_sync_writes_to_generation_activated_mid_fetch() {
        let store = store_with_current("student-portal-v1.0.0").await;
        let next = CacheVersion::new("student-portal-v2.0.0");
        let network = UpgradeDuringFetch { store: store.clone(), next: next.clone() };
        let platform = InMemoryPlatform::new();
        platform.add_client("http://localhost:3000/grades").await;

        let report = agent().run("background-sync-grades", &store, &network, &platform).await.unwrap();

        let entry = store.match_request(&RequestKey::get(&url("/api/grades")), MatchScope::Current).await.unwrap();
        assert_eq!(entry.unwrap().version, next);
        assert_eq!(report.broadcast.delivered.len(), 1);
        assert_eq!(platform.snapshot().await.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_write_trims_runtime_entries() {
        let store = store_with_current("student-portal-v1.0.0").await;
        let handle = store.current_handle().await.unwrap().unwrap();
        for path in ["/api/subjects", "/api/timetable"] {
            let response = Response::synthetic(url(path), StatusCode::OK, "application/json", "[]");
            store.put(&handle, &RequestKey::get(&url(path)), &response.snapshot()).await.unwrap();
        }
        let network = StubNetwork::new();
        network.json(url("/api/grades").as_str(), "[]");
        let platform = InMemoryPlatform::new();

        let agent = SyncAgent::new(Url::parse(ORIGIN).unwrap(), Duration::from_millis(200), Some(2));
        agent.run("background-sync-grades", &store, &network, &platform).await.unwrap();

        assert_eq!(store.count_entries(handle.version()).await.unwrap(), 2);
        let entry = store.match_request(&RequestKey::get(&url("/api/grades")), MatchScope::Current).await.unwrap();
        assert!(entry.is_some());
    }
}
