//! Install and activate.
//!
//! Install fetches the whole precache manifest before writing anything and
//! stores it in one transaction, so a failed install leaves the store exactly
//! as it was and the previous generation keeps serving. Activate promotes the
//! installed generation first and only then removes the stale ones, so there
//! is never a moment without a current generation.

use crate::platform::Platform;
use satchel_client::{Network, Request, Url};
use satchel_core::cache::DeleteReport;
use satchel_core::{CacheDb, CacheVersion, Error, RequestKey, StoredResponse, WorkerConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;

/// Where this agent version is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; this version will never serve.
    Redundant,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
            LifecycleState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub version: CacheVersion,
    /// Precached URLs, in manifest order.
    pub precached: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub version: CacheVersion,
    pub deleted: Vec<CacheVersion>,
    pub failed: Vec<(CacheVersion, String)>,
    pub claimed: bool,
}

/// Lifecycle of one agent version.
#[derive(Debug)]
pub struct Lifecycle {
    version: CacheVersion,
    manifest: Vec<Url>,
    timeout: Duration,
    state: RwLock<LifecycleState>,
}

impl Lifecycle {
    pub fn new(version: CacheVersion, manifest: Vec<Url>, timeout: Duration) -> Self {
        Self { version, manifest, timeout, state: RwLock::new(LifecycleState::Parsed) }
    }

    /// Lifecycle for the configured build, with manifest entries resolved against the origin.
    pub fn from_config(config: &WorkerConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;
        let manifest = config
            .precache
            .iter()
            .map(|entry| origin.join(entry).map_err(|e| Error::InvalidUrl(format!("{entry}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(config.cache_version(), manifest, config.timeout()))
    }

    pub fn version(&self) -> &CacheVersion {
        &self.version
    }

    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    async fn transition(&self, from: &[LifecycleState], to: LifecycleState) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if !from.contains(&state) {
            return Err(Error::InvalidState(format!("cannot move from {} to {}", *state, to)));
        }
        tracing::info!(version = %self.version, from = %*state, to = %to, "lifecycle transition");
        *state = to;
        Ok(())
    }

    async fn set(&self, to: LifecycleState) {
        let mut state = self.state.write().await;
        tracing::info!(version = %self.version, from = %*state, to = %to, "lifecycle transition");
        *state = to;
    }

    /// Precache the manifest into this version's generation.
    ///
    /// Every manifest URL must answer 2xx. On the first failure the remaining
    /// fetches are cancelled, nothing is written and the version becomes
    /// redundant. On success the host is asked to skip waiting.
    pub async fn install(
        &self, store: &CacheDb, network: Arc<dyn Network>, platform: &dyn Platform,
    ) -> Result<InstallReport, Error> {
        self.transition(&[LifecycleState::Parsed, LifecycleState::Redundant], LifecycleState::Installing)
            .await?;

        let entries = match self.fetch_manifest(network).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(version = %self.version, error = %e, "precache failed, install aborted");
                self.set(LifecycleState::Redundant).await;
                return Err(e);
            }
        };

        let precached = entries.iter().map(|(key, _)| key.url.clone()).collect();
        if let Err(e) = store.precache(&self.version, entries).await {
            tracing::error!(version = %self.version, error = %e, "precache write failed, install aborted");
            self.set(LifecycleState::Redundant).await;
            return Err(e);
        }

        self.set(LifecycleState::Installed).await;

        if let Err(e) = platform.skip_waiting().await {
            tracing::warn!(version = %self.version, error = %e, "skip waiting rejected");
        }

        Ok(InstallReport { version: self.version.clone(), precached })
    }

    async fn fetch_manifest(&self, network: Arc<dyn Network>) -> Result<Vec<(RequestKey, StoredResponse)>, Error> {
        let mut join_set = JoinSet::new();

        for (index, url) in self.manifest.iter().cloned().enumerate() {
            let network = network.clone();
            let timeout = self.timeout;
            join_set.spawn(async move {
                let request = Request::get(url.clone());
                let result = match tokio::time::timeout(timeout, network.fetch(&request)).await {
                    Ok(Ok(response)) if response.ok() => Ok((request.key(), response.snapshot())),
                    Ok(Ok(response)) => Err(format!("status {}", response.status.as_u16())),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {timeout:?}")),
                };
                (index, url, result)
            });
        }

        let mut fetched = Vec::with_capacity(self.manifest.len());
        while let Some(joined) = join_set.join_next().await {
            let (index, url, result) = joined.map_err(|e| Error::PrecacheFailed {
                url: "<task>".into(),
                reason: e.to_string(),
            })?;
            match result {
                Ok(entry) => fetched.push((index, entry)),
                Err(reason) => {
                    join_set.shutdown().await;
                    return Err(Error::PrecacheFailed { url: url.to_string(), reason });
                }
            }
        }

        fetched.sort_by_key(|(index, _)| *index);
        Ok(fetched.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Promote this version, delete every other generation, then claim clients.
    pub async fn activate(&self, store: &CacheDb, platform: &dyn Platform) -> Result<ActivateReport, Error> {
        self.transition(&[LifecycleState::Installed], LifecycleState::Activating).await?;

        if let Err(e) = store.promote(&self.version).await {
            tracing::error!(version = %self.version, error = %e, "promotion failed");
            self.set(LifecycleState::Installed).await;
            return Err(e);
        }

        let DeleteReport { deleted, failed } = match store.delete_all_except(&self.version).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(version = %self.version, error = %e, "stale generation cleanup failed");
                DeleteReport::default()
            }
        };
        for version in &deleted {
            tracing::info!(stale = %version, "deleted stale generation");
        }

        let claimed = match platform.claim_clients().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(version = %self.version, error = %e, "claiming clients failed");
                false
            }
        };

        self.set(LifecycleState::Activated).await;
        Ok(ActivateReport { version: self.version.clone(), deleted, failed, claimed })
    }
}
