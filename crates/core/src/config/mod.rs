//! Worker configuration with layered loading.
//!
//! Everything the agent used to keep as module-level constants (cache name,
//! precache manifest, API patterns, timeouts) lives here and is passed into
//! the worker at construction. Sources, highest precedence first:
//!
//! 1. Environment variables (SATCHEL_*)
//! 2. TOML config file (if SATCHEL_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::CacheVersion;

mod validation;

pub use validation::ConfigError;

/// Configuration of the offline cache agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Application name, the first half of the cache version.
    ///
    /// Set via SATCHEL_APP_NAME environment variable.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Semantic build version, the second half of the cache version.
    ///
    /// Set via SATCHEL_VERSION environment variable.
    #[serde(default = "default_version")]
    pub version: String,

    /// Origin the agent serves; relative URLs resolve against it.
    ///
    /// Set via SATCHEL_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to the SQLite cache database.
    ///
    /// Set via SATCHEL_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network requests.
    ///
    /// Set via SATCHEL_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum response body size in bytes.
    ///
    /// Set via SATCHEL_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Network timeout in milliseconds for static assets, precache and sync.
    ///
    /// Set via SATCHEL_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Bound on the network-vs-timer race for API requests.
    ///
    /// Set via SATCHEL_API_TIMEOUT_MS environment variable.
    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,

    /// Bound on the network attempt for document loads.
    ///
    /// Set via SATCHEL_NAVIGATION_TIMEOUT_MS environment variable.
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// URLs fetched and stored at install; any failure aborts the install.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Document served to navigations when both network and cache miss.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Path regexes that mark a request as API traffic.
    #[serde(default = "default_api_patterns")]
    pub api_patterns: Vec<String>,

    /// Cap on runtime (non-precached) entries per generation; `None` disables trimming.
    #[serde(default = "default_max_runtime_entries")]
    pub max_runtime_entries: Option<usize>,

    /// Push notification presentation.
    #[serde(default)]
    pub notification: NotificationConfig,
}

/// Defaults applied to every push notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_title")]
    pub default_title: String,
    #[serde(default = "default_body")]
    pub default_body: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_badge")]
    pub badge: String,
    /// In-app view opened by the `explore` action.
    #[serde(default = "default_explore_url")]
    pub explore_url: String,
    #[serde(default = "default_vibrate")]
    pub vibrate: Vec<u32>,
}

fn default_app_name() -> String {
    "student-portal".into()
}

fn default_version() -> String {
    "1.0.0".into()
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./satchel-cache.sqlite")
}

fn default_user_agent() -> String {
    "satchel/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_api_timeout_ms() -> u64 {
    5_000
}

fn default_navigation_timeout_ms() -> u64 {
    10_000
}

fn default_precache() -> Vec<String> {
    vec!["/".into(), "/offline".into(), "/manifest.json".into(), "/icons/icon-192x192.png".into()]
}

fn default_offline_page() -> String {
    "/offline".into()
}

fn default_api_patterns() -> Vec<String> {
    ["grades", "timetable", "notifications", "analytics", "subjects", "health"]
        .iter()
        .map(|domain| format!("^/api/{domain}(/|$)"))
        .collect()
}

fn default_max_runtime_entries() -> Option<usize> {
    Some(200)
}

fn default_title() -> String {
    "Student Portal".into()
}

fn default_body() -> String {
    "You have new updates in your student portal".into()
}

fn default_icon() -> String {
    "/icons/icon-192x192.png".into()
}

fn default_badge() -> String {
    "/icons/badge-72x72.png".into()
}

fn default_explore_url() -> String {
    "/notifications".into()
}

fn default_vibrate() -> Vec<u32> {
    vec![100, 50, 100]
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_title: default_title(),
            default_body: default_body(),
            icon: default_icon(),
            badge: default_badge(),
            explore_url: default_explore_url(),
            vibrate: default_vibrate(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            version: default_version(),
            origin: default_origin(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            api_timeout_ms: default_api_timeout_ms(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            precache: default_precache(),
            offline_page: default_offline_page(),
            api_patterns: default_api_patterns(),
            max_runtime_entries: default_max_runtime_entries(),
            notification: NotificationConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Version of the generation this build installs, e.g. `student-portal-v1.0.0`.
    pub fn cache_version(&self) -> CacheVersion {
        CacheVersion::for_build(&self.app_name, &self.version)
    }

    /// General network timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Parsed origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SATCHEL_` (`__` separates nested keys)
    /// 2. TOML file from `SATCHEL_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SATCHEL_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SATCHEL_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./satchel-cache.sqlite"));
        assert_eq!(config.user_agent, "satchel/0.1");
        assert_eq!(config.api_timeout_ms, 5_000);
        assert_eq!(config.offline_page, "/offline");
        assert!(config.precache.contains(&"/offline".to_string()));
        assert_eq!(config.api_patterns.len(), 6);
        assert_eq!(config.notification.explore_url, "/notifications");
    }

    #[test]
    fn test_cache_version() {
        let config = WorkerConfig { app_name: "portal".into(), version: "2.1.0".into(), ..Default::default() };
        assert_eq!(config.cache_version().as_str(), "portal-v2.1.0");
    }

    #[test]
    fn test_timeout_durations() {
        let config = WorkerConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.api_timeout(), Duration::from_secs(5));
        assert_eq!(config.navigation_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_origin_url() {
        let config = WorkerConfig::default();
        assert_eq!(config.origin_url().unwrap().as_str(), "http://localhost:3000/");

        let config = WorkerConfig { origin: "not a url".into(), ..Default::default() };
        assert!(matches!(config.origin_url(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_load_from_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SATCHEL_VERSION", "3.0.1");
            jail.set_env("SATCHEL_API_TIMEOUT_MS", "2500");
            jail.set_env("SATCHEL_NOTIFICATION__DEFAULT_TITLE", "Campus");

            let config = WorkerConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.cache_version().as_str(), "student-portal-v3.0.1");
            assert_eq!(config.api_timeout_ms, 2500);
            assert_eq!(config.notification.default_title, "Campus");
            assert_eq!(config.notification.explore_url, "/notifications");
            Ok(())
        });
    }

    #[test]
    fn test_load_from_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "satchel.toml",
                r#"
                app_name = "campus"
                precache = ["/", "/offline"]
                "#,
            )?;
            jail.set_env("SATCHEL_CONFIG_FILE", "satchel.toml");

            let config = WorkerConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.app_name, "campus");
            assert_eq!(config.precache, vec!["/".to_string(), "/offline".to_string()]);
            Ok(())
        });
    }
}
