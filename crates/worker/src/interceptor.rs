//! Fetch interception: classify, pick a policy, run it.

use crate::selector::{RequestClass, StrategyPolicy, StrategySelector};
use crate::strategy::StrategyRunner;
use satchel_client::{Request, Response};

/// What the agent does with an intercepted request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The agent answers with this response.
    Respond(Response),
    /// The agent declines; the host sends the request to the network untouched.
    Passthrough,
}

/// One handled fetch event.
#[derive(Debug, Clone)]
pub struct Intercepted {
    pub class: RequestClass,
    pub policy: StrategyPolicy,
    pub outcome: FetchOutcome,
}

/// Entry point for fetch events.
#[derive(Clone)]
pub struct FetchInterceptor {
    selector: StrategySelector,
    runner: StrategyRunner,
}

impl FetchInterceptor {
    pub fn new(selector: StrategySelector, runner: StrategyRunner) -> Self {
        Self { selector, runner }
    }

    pub fn selector(&self) -> &StrategySelector {
        &self.selector
    }

    pub async fn handle_fetch(&self, request: &Request) -> Intercepted {
        let class = self.selector.classify_request(request);
        let policy = self.selector.policy(class);
        tracing::debug!(method = %request.method, url = %request.url, ?class, strategy = policy.name(), "fetch");

        let outcome = match self.runner.execute(request, &policy).await {
            Some(response) => FetchOutcome::Respond(response),
            None => FetchOutcome::Passthrough,
        };

        Intercepted { class, policy, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ORIGIN, StubNetwork, store_with_current, url};
    use satchel_client::{Method, RequestMode, ResponseSource, StatusCode, Url};
    use satchel_core::{CacheDb, CacheVersion, WorkerConfig};
    use std::sync::Arc;
    use std::time::Duration;

    const VERSION: &str = "student-portal-v1.0.0";

    fn interceptor(store: &CacheDb, network: &Arc<StubNetwork>) -> FetchInterceptor {
        let config = WorkerConfig { api_timeout_ms: 100, navigation_timeout_ms: 100, ..Default::default() };
        let runner = StrategyRunner::new(
            store.clone(),
            network.clone(),
            Duration::from_millis(100),
            None,
            Url::parse(ORIGIN).unwrap(),
        );
        FetchInterceptor::new(StrategySelector::from_config(&config).unwrap(), runner)
    }

    fn response(outcome: FetchOutcome) -> Response {
        match outcome {
            FetchOutcome::Respond(response) => response,
            FetchOutcome::Passthrough => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn test_non_get_never_touches_cache() {
        let store = store_with_current(VERSION).await;
        let network = Arc::new(StubNetwork::new());
        network.json(url("/api/grades").as_str(), "[]");
        let interceptor = interceptor(&store, &network);

        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            let intercepted = interceptor.handle_fetch(&Request::new(method, url("/api/grades"))).await;
            assert_eq!(intercepted.class, RequestClass::Ignored);
            assert!(matches!(intercepted.outcome, FetchOutcome::Passthrough));
        }

        assert_eq!(network.calls(), 0);
        assert_eq!(store.count_entries(&CacheVersion::new(VERSION)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_api_round_trip_online_then_offline() {
        let store = store_with_current(VERSION).await;
        let network = Arc::new(StubNetwork::new());
        network.json(url("/api/subjects").as_str(), r#"[{"id":1,"name":"Chemistry"}]"#);
        let interceptor = interceptor(&store, &network);
        let request = Request::get(url("/api/subjects"));

        let online = response(interceptor.handle_fetch(&request).await.outcome);
        assert_eq!(online.source, ResponseSource::Network);

        network.hang(url("/api/subjects").as_str());
        let intercepted = interceptor.handle_fetch(&request).await;
        assert_eq!(intercepted.policy.name(), "network-first");
        let offline = response(intercepted.outcome);
        assert_eq!(offline.header("served-by"), Some("ServiceWorker-Cache"));
        assert_eq!(offline.body, online.body);
    }

    #[tokio::test]
    async fn test_grades_timeout_without_cache() {
        let store = store_with_current(VERSION).await;
        let network = Arc::new(StubNetwork::new());
        network.hang(url("/api/grades").as_str());

        let intercepted = interceptor(&store, &network).handle_fetch(&Request::get(url("/api/grades"))).await;

        let response = response(intercepted.outcome);
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["offline"], true);
    }

    #[tokio::test]
    async fn test_static_precached_serves_without_network() {
        let store = store_with_current(VERSION).await;
        let network = Arc::new(StubNetwork::new());
        let handle = store.current_handle().await.unwrap().unwrap();
        let icon = Request::get(url("/icons/icon-192x192.png")).with_mode(RequestMode::NoCors);
        let cached = Response::synthetic(icon.url.clone(), StatusCode::OK, "image/png", &b"\x89PNG"[..]);
        store.put(&handle, &icon.key(), &cached.snapshot()).await.unwrap();

        let intercepted = interceptor(&store, &network).handle_fetch(&icon).await;

        assert_eq!(intercepted.class, RequestClass::Static);
        assert_eq!(response(intercepted.outcome).source, ResponseSource::Cache);
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_navigation_offline_document() {
        let store = store_with_current(VERSION).await;
        let network = Arc::new(StubNetwork::new());

        let intercepted = interceptor(&store, &network).handle_fetch(&Request::navigate(url("/grades"))).await;

        assert_eq!(intercepted.class, RequestClass::Navigation);
        let response = response(intercepted.outcome);
        assert_eq!(response.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(response.header("served-by"), Some("ServiceWorker-Offline"));
    }

    #[tokio::test]
    async fn test_concurrent_fetches_same_key() {
        let store = store_with_current(VERSION).await;
        let network = Arc::new(StubNetwork::new());
        network.json(url("/api/timetable").as_str(), r#"{"week":1}"#);
        let interceptor = interceptor(&store, &network);
        let request = Request::get(url("/api/timetable"));

        let (a, b, c) = tokio::join!(
            interceptor.handle_fetch(&request),
            interceptor.handle_fetch(&request),
            interceptor.handle_fetch(&request)
        );

        for intercepted in [a, b, c] {
            assert_eq!(response(intercepted.outcome).status, StatusCode::OK);
        }
        assert_eq!(store.count_entries(&CacheVersion::new(VERSION)).await.unwrap(), 1);
    }
}
