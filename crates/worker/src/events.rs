//! Event dispatch.
//!
//! The host delivers one [`Event`] at a time; [`dispatch`] runs its handler
//! and turns any failure into [`EventOutcome::Failed`], so a failed event is
//! logged and the agent keeps serving the next one.

use crate::interceptor::Intercepted;
use crate::lifecycle::{ActivateReport, InstallReport};
use crate::notify::{ClickOutcome, NotificationClick};
use crate::platform::Notification;
use crate::sync::SyncReport;
use crate::worker::{MessageReply, ServiceWorker};
use satchel_client::Request;
use serde_json::Value;

/// Everything the host can deliver to the agent.
#[derive(Debug, Clone)]
pub enum Event {
    Install,
    Activate,
    Fetch(Request),
    Push { payload: Option<String> },
    NotificationClick(NotificationClick),
    Sync { tag: String },
    Message(Value),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Install => "install",
            Event::Activate => "activate",
            Event::Fetch(_) => "fetch",
            Event::Push { .. } => "push",
            Event::NotificationClick(_) => "notificationclick",
            Event::Sync { .. } => "sync",
            Event::Message(_) => "message",
        }
    }
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetched(Intercepted),
    NotificationShown(Notification),
    NotificationClicked(ClickOutcome),
    Synced(SyncReport),
    Replied(MessageReply),
    Failed { event: &'static str, error: satchel_core::Error },
}

impl EventOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, EventOutcome::Failed { .. })
    }
}

/// Run the handler for `event`.
pub async fn dispatch(worker: &ServiceWorker, event: Event) -> EventOutcome {
    let name = event.name();
    let result = match event {
        Event::Install => worker.install().await.map(EventOutcome::Installed),
        Event::Activate => worker.activate().await.map(EventOutcome::Activated),
        Event::Fetch(request) => Ok(EventOutcome::Fetched(worker.fetch(&request).await)),
        Event::Push { payload } => worker.push(payload.as_deref()).await.map(EventOutcome::NotificationShown),
        Event::NotificationClick(click) => {
            worker.notification_click(&click).await.map(EventOutcome::NotificationClicked)
        }
        Event::Sync { tag } => worker.sync(&tag).await.map(EventOutcome::Synced),
        Event::Message(data) => worker.message(&data).await.map(EventOutcome::Replied),
    };

    match result {
        Ok(outcome) => outcome,
        Err(error) => {
            tracing::error!(event = name, error = %error, "event handler failed");
            EventOutcome::Failed { event: name, error }
        }
    }
}
