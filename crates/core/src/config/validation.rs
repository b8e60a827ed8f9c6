//! Configuration validation rules.
//!
//! This module provides validation logic for `WorkerConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::WorkerConfig;
use regex::Regex;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if value < 100 {
        return Err(invalid(field, "must be at least 100ms"));
    }
    if value > 300_000 {
        return Err(invalid(field, "must not exceed 5 minutes (300000ms)"));
    }
    Ok(())
}

impl WorkerConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `app_name` is empty or `version` is not a semantic version
    /// - `origin` is not an http(s) URL
    /// - a timeout is below 100ms or above 5 minutes
    /// - `api_timeout_ms` or `navigation_timeout_ms` exceeds `timeout_ms`
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - an API pattern is not a valid regex
    ///
    /// Returns `ConfigError::Missing` if no API patterns are configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.trim().is_empty() {
            return Err(invalid("app_name", "must not be empty"));
        }
        semver::Version::parse(&self.version).map_err(|e| invalid("version", e.to_string()))?;

        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(invalid("origin", format!("unsupported scheme: {}", origin.scheme())));
        }

        check_timeout("timeout_ms", self.timeout_ms)?;
        check_timeout("api_timeout_ms", self.api_timeout_ms)?;
        check_timeout("navigation_timeout_ms", self.navigation_timeout_ms)?;
        if self.api_timeout_ms > self.timeout_ms {
            return Err(invalid("api_timeout_ms", "must not exceed timeout_ms"));
        }
        if self.navigation_timeout_ms > self.timeout_ms {
            return Err(invalid("navigation_timeout_ms", "must not exceed timeout_ms"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.api_patterns.is_empty() {
            return Err(ConfigError::Missing {
                field: "api_patterns".into(),
                hint: "API traffic would be cached as static assets".into(),
            });
        }
        for pattern in &self.api_patterns {
            Regex::new(pattern).map_err(|e| invalid("api_patterns", format!("{pattern}: {e}")))?;
        }

        if !self.precache.iter().any(|url| url == &self.offline_page) {
            tracing::warn!(
                offline_page = %self.offline_page,
                "offline_page is not in the precache manifest; navigations will fall back to the built-in document"
            );
        }

        Ok(())
    }
}
