//! The assembled offline agent.

use crate::interceptor::{FetchInterceptor, Intercepted};
use crate::lifecycle::{ActivateReport, InstallReport, Lifecycle, LifecycleState};
use crate::notify::{ClickOutcome, NotificationAgent, NotificationClick};
use crate::platform::{Notification, Platform};
use crate::selector::StrategySelector;
use crate::strategy::StrategyRunner;
use crate::sync::{SyncAgent, SyncReport};
use satchel_client::{Network, Request, Url};
use satchel_core::cache::Generation;
use satchel_core::{CacheDb, CacheVersion, Error, WorkerConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Message types clients may post to the agent.
pub const MESSAGE_SKIP_WAITING: &str = "SKIP_WAITING";
pub const MESSAGE_GET_VERSION: &str = "GET_VERSION";

/// Answer to a client message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageReply {
    SkippedWaiting,
    Version { version: CacheVersion },
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub version: CacheVersion,
    pub state: LifecycleState,
    pub current_generation: Option<CacheVersion>,
    pub generations: Vec<Generation>,
}

/// One agent version bound to a store, a network and a host platform.
pub struct ServiceWorker {
    config: WorkerConfig,
    origin: Url,
    store: CacheDb,
    network: Arc<dyn Network>,
    platform: Arc<dyn Platform>,
    interceptor: FetchInterceptor,
    lifecycle: Lifecycle,
    notifications: NotificationAgent,
    sync: SyncAgent,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig, store: CacheDb, network: Arc<dyn Network>, platform: Arc<dyn Platform>,
    ) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;
        let selector = StrategySelector::from_config(&config)?;
        let runner = StrategyRunner::new(
            store.clone(),
            network.clone(),
            config.timeout(),
            config.max_runtime_entries,
            origin.clone(),
        );
        let lifecycle = Lifecycle::from_config(&config)?;
        let notifications = NotificationAgent::new(config.notification.clone(), origin.clone());
        let sync = SyncAgent::new(origin.clone(), config.timeout(), config.max_runtime_entries);

        Ok(Self {
            config,
            origin,
            store,
            network,
            platform,
            interceptor: FetchInterceptor::new(selector, runner),
            lifecycle,
            notifications,
            sync,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn store(&self) -> &CacheDb {
        &self.store
    }

    pub fn version(&self) -> &CacheVersion {
        self.lifecycle.version()
    }

    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.lifecycle.install(&self.store, self.network.clone(), self.platform.as_ref()).await
    }

    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.lifecycle.activate(&self.store, self.platform.as_ref()).await
    }

    pub async fn fetch(&self, request: &Request) -> Intercepted {
        self.interceptor.handle_fetch(request).await
    }

    pub async fn push(&self, payload: Option<&str>) -> Result<Notification, Error> {
        self.notifications.push(payload, self.platform.as_ref()).await
    }

    pub async fn notification_click(&self, click: &NotificationClick) -> Result<ClickOutcome, Error> {
        self.notifications.click(click, self.platform.as_ref()).await
    }

    pub async fn sync(&self, tag: &str) -> Result<SyncReport, Error> {
        self.sync.run(tag, &self.store, self.network.as_ref(), self.platform.as_ref()).await
    }

    /// Handle a message posted by a client.
    ///
    /// `GET_VERSION` answers with the generation currently serving, or this
    /// agent's own version before the first activation.
    pub async fn message(&self, data: &Value) -> Result<MessageReply, Error> {
        let kind = data.get("type").and_then(Value::as_str).unwrap_or_default();
        match kind {
            MESSAGE_SKIP_WAITING => {
                self.platform.skip_waiting().await?;
                Ok(MessageReply::SkippedWaiting)
            }
            MESSAGE_GET_VERSION => {
                let version = self.store.current_generation().await?.unwrap_or_else(|| self.version().clone());
                Ok(MessageReply::Version { version })
            }
            other => Err(Error::InvalidInput(format!("unsupported client message type {other:?}"))),
        }
    }

    pub async fn status(&self) -> Result<WorkerStatus, Error> {
        Ok(WorkerStatus {
            version: self.version().clone(),
            state: self.lifecycle.state().await,
            current_generation: self.store.current_generation().await?,
            generations: self.store.list_generations().await?,
        })
    }
}
