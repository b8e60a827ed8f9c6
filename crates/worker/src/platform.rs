//! Host platform seam.
//!
//! The agent never owns windows, clients or the notification tray; it asks
//! the host through [`Platform`]. [`InMemoryPlatform`] records every call
//! and is what the stdio host and the tests run against.

use async_trait::async_trait;
use satchel_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

/// An open page controlled (or controllable) by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: String,
    pub url: String,
    pub focused: bool,
}

/// A button shown on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// A notification handed to the host for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// De-duplication key; showing a notification with the same tag replaces the old one.
    pub tag: String,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: serde_json::Map<String, Value>,
    pub actions: Vec<NotificationAction>,
}

/// Everything the host runtime owns.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Ask the host to activate the installed version without waiting for old clients to close.
    async fn skip_waiting(&self) -> Result<(), Error>;

    /// Route every open client through this agent.
    async fn claim_clients(&self) -> Result<(), Error>;

    /// Window clients currently open at the origin.
    async fn clients(&self) -> Result<Vec<ClientInfo>, Error>;

    async fn post_message(&self, client_id: &str, message: &Value) -> Result<(), Error>;

    async fn focus(&self, client_id: &str) -> Result<(), Error>;

    /// Open a new window at `url` and return it.
    async fn open_window(&self, url: &str) -> Result<ClientInfo, Error>;

    async fn show_notification(&self, notification: &Notification) -> Result<(), Error>;

    async fn close_notification(&self, tag: &str) -> Result<(), Error>;
}

/// Observable state of an [`InMemoryPlatform`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlatformSnapshot {
    pub clients: Vec<ClientInfo>,
    pub claimed: bool,
    pub skip_waiting_calls: u32,
    pub messages: Vec<(String, Value)>,
    pub notifications: Vec<Notification>,
    pub closed: Vec<String>,
    pub focused: Vec<String>,
    pub opened: Vec<String>,
}

#[derive(Debug, Default)]
struct PlatformState {
    snapshot: PlatformSnapshot,
    unreachable: Vec<String>,
    next_client: u32,
}

/// Platform that keeps clients and notifications in memory and records every call.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-open client at `url`.
    pub async fn add_client(&self, url: &str) -> ClientInfo {
        let mut state = self.state.lock().await;
        state.next_client += 1;
        let client = ClientInfo { id: format!("client-{}", state.next_client), url: url.to_string(), focused: false };
        state.snapshot.clients.push(client.clone());
        client
    }

    /// Make message delivery to `client_id` fail.
    pub async fn set_unreachable(&self, client_id: &str) {
        self.state.lock().await.unreachable.push(client_id.to_string());
    }

    pub async fn snapshot(&self) -> PlatformSnapshot {
        self.state.lock().await.snapshot.clone()
    }
}

#[async_trait]
impl Platform for InMemoryPlatform {
    async fn skip_waiting(&self) -> Result<(), Error> {
        self.state.lock().await.snapshot.skip_waiting_calls += 1;
        Ok(())
    }

    async fn claim_clients(&self) -> Result<(), Error> {
        self.state.lock().await.snapshot.claimed = true;
        Ok(())
    }

    async fn clients(&self) -> Result<Vec<ClientInfo>, Error> {
        Ok(self.state.lock().await.snapshot.clients.clone())
    }

    async fn post_message(&self, client_id: &str, message: &Value) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.unreachable.iter().any(|id| id == client_id) {
            return Err(Error::Platform(format!("client {client_id} is unreachable")));
        }
        if !state.snapshot.clients.iter().any(|c| c.id == client_id) {
            return Err(Error::Platform(format!("no client {client_id}")));
        }
        state.snapshot.messages.push((client_id.to_string(), message.clone()));
        Ok(())
    }

    async fn focus(&self, client_id: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if !state.snapshot.clients.iter().any(|c| c.id == client_id) {
            return Err(Error::Platform(format!("no client {client_id}")));
        }
        for client in &mut state.snapshot.clients {
            client.focused = client.id == client_id;
        }
        state.snapshot.focused.push(client_id.to_string());
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<ClientInfo, Error> {
        let mut state = self.state.lock().await;
        state.next_client += 1;
        let client = ClientInfo { id: format!("client-{}", state.next_client), url: url.to_string(), focused: true };
        for other in &mut state.snapshot.clients {
            other.focused = false;
        }
        state.snapshot.clients.push(client.clone());
        state.snapshot.opened.push(url.to_string());
        Ok(client)
    }

    async fn show_notification(&self, notification: &Notification) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.snapshot.notifications.retain(|n| n.tag != notification.tag);
        state.snapshot.notifications.push(notification.clone());
        Ok(())
    }

    async fn close_notification(&self, tag: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.snapshot.notifications.retain(|n| n.tag != tag);
        state.snapshot.closed.push(tag.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(tag: &str, title: &str) -> Notification {
        Notification {
            tag: tag.into(),
            title: title.into(),
            body: String::new(),
            icon: String::new(),
            badge: String::new(),
            vibrate: vec![],
            data: Default::default(),
            actions: vec![],
        }
    }

    #[tokio::test]
    async fn test_open_window_takes_focus() {
        let platform = InMemoryPlatform::new();
        let first = platform.add_client("http://localhost:3000/").await;
        platform.focus(&first.id).await.unwrap();

        let opened = platform.open_window("http://localhost:3000/notifications").await.unwrap();

        let snapshot = platform.snapshot().await;
        assert_eq!(snapshot.clients.len(), 2);
        assert!(snapshot.clients.iter().find(|c| c.id == opened.id).unwrap().focused);
        assert!(!snapshot.clients.iter().find(|c| c.id == first.id).unwrap().focused);
        assert_eq!(snapshot.opened, vec!["http://localhost:3000/notifications"]);
    }

    #[tokio::test]
    async fn test_focus_unknown_client() {
        let platform = InMemoryPlatform::new();
        assert!(matches!(platform.focus("client-9").await, Err(Error::Platform(_))));
    }

    #[tokio::test]
    async fn test_post_message_unreachable() {
        let platform = InMemoryPlatform::new();
        let client = platform.add_client("http://localhost:3000/").await;
        platform.set_unreachable(&client.id).await;

        let result = platform.post_message(&client.id, &serde_json::json!({"type": "X"})).await;

        assert!(result.is_err());
        assert!(platform.snapshot().await.messages.is_empty());
    }

    #[tokio::test]
    async fn test_notification_tag_replaces() {
        let platform = InMemoryPlatform::new();
        platform.show_notification(&notification("a", "first")).await.unwrap();
        platform.show_notification(&notification("a", "second")).await.unwrap();
        platform.show_notification(&notification("b", "other")).await.unwrap();

        let snapshot = platform.snapshot().await;
        assert_eq!(snapshot.notifications.len(), 2);
        assert_eq!(snapshot.notifications[0].title, "second");

        platform.close_notification("a").await.unwrap();
        let snapshot = platform.snapshot().await;
        assert_eq!(snapshot.notifications.len(), 1);
        assert_eq!(snapshot.closed, vec!["a"]);
    }
}
