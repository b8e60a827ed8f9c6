//! Request classification.
//!
//! Every intercepted request gets exactly one [`RequestClass`], computed from
//! its method, URL and mode alone. Path rules live in one ordered table of
//! (pattern, class) pairs; the first matching rule wins.

use regex::Regex;
use satchel_client::{Method, Request, RequestMode, Url};
use satchel_core::{Error, WorkerConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Traffic class of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    Navigation,
    Api,
    Static,
    /// Not handled by the agent at all.
    Ignored,
}

/// The strategy applied to a class, with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum StrategyPolicy {
    NetworkFirst { timeout_ms: u64 },
    CacheFirst,
    NavigationFallback { timeout_ms: u64, fallback: String },
    Passthrough,
}

impl StrategyPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyPolicy::NetworkFirst { .. } => "network-first",
            StrategyPolicy::CacheFirst => "cache-first",
            StrategyPolicy::NavigationFallback { .. } => "navigation-fallback",
            StrategyPolicy::Passthrough => "passthrough",
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Regex,
    class: RequestClass,
}

/// Maps requests to classes and classes to policies.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    rules: Vec<Rule>,
    api_timeout: Duration,
    navigation_timeout: Duration,
    offline_page: String,
}

impl StrategySelector {
    /// Selector whose rule table marks every pattern in `api_patterns` as API traffic.
    pub fn new(api_patterns: &[String], api_timeout: Duration, navigation_timeout: Duration) -> Result<Self, Error> {
        let mut selector =
            Self { rules: Vec::new(), api_timeout, navigation_timeout, offline_page: "/offline".to_string() };
        for pattern in api_patterns {
            selector = selector.with_rule(pattern, RequestClass::Api)?;
        }
        Ok(selector)
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self, Error> {
        let mut selector = Self::new(&config.api_patterns, config.api_timeout(), config.navigation_timeout())?;
        selector.offline_page = config.offline_page.clone();
        Ok(selector)
    }

    /// Append a path rule; rules added earlier take precedence.
    pub fn with_rule(mut self, pattern: &str, class: RequestClass) -> Result<Self, Error> {
        let pattern =
            Regex::new(pattern).map_err(|e| Error::InvalidInput(format!("invalid pattern {pattern:?}: {e}")))?;
        self.rules.push(Rule { pattern, class });
        Ok(self)
    }

    /// Classify by method, URL and request mode.
    ///
    /// Order: non-GET and non-HTTP(S) requests are ignored, then the rule
    /// table is consulted on the URL path, then document loads are
    /// navigations, and everything else is a static asset.
    pub fn classify(&self, method: &Method, url: &Url, mode: RequestMode) -> RequestClass {
        if method != Method::GET {
            return RequestClass::Ignored;
        }
        if !matches!(url.scheme(), "http" | "https") {
            return RequestClass::Ignored;
        }

        let path = url.path();
        if let Some(rule) = self.rules.iter().find(|rule| rule.pattern.is_match(path)) {
            return rule.class;
        }

        if mode == RequestMode::Navigate {
            RequestClass::Navigation
        } else {
            RequestClass::Static
        }
    }

    pub fn classify_request(&self, request: &Request) -> RequestClass {
        self.classify(&request.method, &request.url, request.mode)
    }

    /// The policy applied to `class`.
    pub fn policy(&self, class: RequestClass) -> StrategyPolicy {
        match class {
            RequestClass::Api => StrategyPolicy::NetworkFirst { timeout_ms: self.api_timeout.as_millis() as u64 },
            RequestClass::Static => StrategyPolicy::CacheFirst,
            RequestClass::Navigation => StrategyPolicy::NavigationFallback {
                timeout_ms: self.navigation_timeout.as_millis() as u64,
                fallback: self.offline_page.clone(),
            },
            RequestClass::Ignored => StrategyPolicy::Passthrough,
        }
    }
}
