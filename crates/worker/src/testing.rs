//! Scripted network and fixtures for worker tests.

use async_trait::async_trait;
use bytes::Bytes;
use satchel_client::header::{self, HeaderMap, HeaderValue};
use satchel_client::{Network, Request, Response, ResponseSource, StatusCode, Url};
use satchel_core::{CacheDb, CacheVersion, Error};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Route {
    Respond { status: u16, content_type: String, body: String },
    Fail(String),
    Hang,
}

/// A [`Network`] that answers from a table of scripted routes and counts calls.
///
/// Unscripted URLs fail like an unreachable host.
#[derive(Debug, Default)]
pub struct StubNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
}

impl StubNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, content_type: &str, body: &str) {
        let route = Route::Respond { status, content_type: content_type.into(), body: body.into() };
        self.routes.lock().unwrap().insert(url.to_string(), route);
    }

    pub fn json(&self, url: &str, body: &str) {
        self.respond(url, 200, "application/json", body);
    }

    pub fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Route::Fail("connection refused".into()));
    }

    /// Never answer requests for `url`.
    pub fn hang(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Route::Hang);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.as_str().to_string();
        self.calls.lock().unwrap().push(url.clone());
        let route = self.routes.lock().unwrap().get(&url).cloned();

        match route {
            Some(Route::Respond { status, content_type, body }) => {
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(&content_type).unwrap());
                Ok(Response {
                    url: request.url.clone(),
                    status: StatusCode::from_u16(status).unwrap(),
                    headers,
                    body: Bytes::from(body),
                    source: ResponseSource::Network,
                    fetch_ms: 1,
                })
            }
            Some(Route::Fail(reason)) => Err(Error::HttpError(reason)),
            Some(Route::Hang) => std::future::pending().await,
            None => Err(Error::HttpError(format!("no route to {url}"))),
        }
    }
}

pub const ORIGIN: &str = "http://localhost:3000";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// In-memory store with `version` opened and current.
pub async fn store_with_current(version: &str) -> CacheDb {
    let store = CacheDb::open_in_memory().await.unwrap();
    let version = CacheVersion::new(version);
    store.open_generation(&version).await.unwrap();
    store.promote(&version).await.unwrap();
    store
}
