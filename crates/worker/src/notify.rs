//! Push notifications and notification clicks.

use crate::platform::{ClientInfo, Notification, NotificationAction, Platform};
use satchel_client::Url;
use satchel_core::{Error, NotificationConfig, now_iso8601};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ACTION_EXPLORE: &str = "explore";
pub const ACTION_CLOSE: &str = "close";

/// Tag shared by every push notification, so a newer push replaces the older one.
pub const NOTIFICATION_TAG: &str = "student-portal-update";

/// A push payload after defaults are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// Every payload field other than `title` and `body`.
    pub data: Map<String, Value>,
}

/// Parse a push payload, falling back to the configured defaults.
///
/// A missing payload, invalid JSON or a non-object value all yield the
/// default title and body with no extra data.
pub fn parse_push_payload(payload: Option<&str>, defaults: &NotificationConfig) -> PushMessage {
    let mut message =
        PushMessage { title: defaults.default_title.clone(), body: defaults.default_body.clone(), data: Map::new() };

    let Some(raw) = payload.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return message;
    };

    let mut fields = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => {
            tracing::warn!(kind = %json_kind(&other), "push payload is not an object, using defaults");
            return message;
        }
        Err(e) => {
            tracing::warn!(error = %e, "unparseable push payload, using defaults");
            return message;
        }
    };

    if let Some(Value::String(title)) = fields.remove("title") {
        message.title = title;
    }
    if let Some(Value::String(body)) = fields.remove("body") {
        message.body = body;
    }
    message.data = fields;
    message
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A click on a shown notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationClick {
    pub tag: String,
    /// The action button pressed; `None` for a click on the notification body.
    #[serde(default)]
    pub action: Option<String>,
}

/// What a notification click did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
    Focused { client_id: String },
    Opened { client_id: String, url: String },
    Dismissed,
}

/// Shows push notifications and routes clicks to client windows.
#[derive(Debug, Clone)]
pub struct NotificationAgent {
    config: NotificationConfig,
    origin: Url,
}

impl NotificationAgent {
    pub fn new(config: NotificationConfig, origin: Url) -> Self {
        Self { config, origin }
    }

    pub fn build_notification(&self, message: PushMessage) -> Notification {
        let mut data = message.data;
        data.insert("date_of_arrival".into(), Value::String(now_iso8601()));

        Notification {
            tag: NOTIFICATION_TAG.to_string(),
            title: message.title,
            body: message.body,
            icon: self.config.icon.clone(),
            badge: self.config.badge.clone(),
            vibrate: self.config.vibrate.clone(),
            data,
            actions: vec![
                NotificationAction {
                    action: ACTION_EXPLORE.into(),
                    title: "View Details".into(),
                    icon: Some(self.config.icon.clone()),
                },
                NotificationAction { action: ACTION_CLOSE.into(), title: "Close".into(), icon: None },
            ],
        }
    }

    /// Handle a push event: parse the payload and show the notification.
    pub async fn push(&self, payload: Option<&str>, platform: &dyn Platform) -> Result<Notification, Error> {
        let notification = self.build_notification(parse_push_payload(payload, &self.config));
        platform.show_notification(&notification).await?;
        tracing::info!(title = %notification.title, "notification shown");
        Ok(notification)
    }

    /// Handle a click. The notification is always closed first.
    ///
    /// `explore` focuses a window already on the explore view or opens it; a
    /// body click focuses any window at the origin or opens the app root;
    /// `close` only dismisses.
    pub async fn click(&self, click: &NotificationClick, platform: &dyn Platform) -> Result<ClickOutcome, Error> {
        if let Err(e) = platform.close_notification(&click.tag).await {
            tracing::warn!(tag = %click.tag, error = %e, "closing notification failed");
        }

        match click.action.as_deref() {
            Some(ACTION_CLOSE) => Ok(ClickOutcome::Dismissed),
            Some(ACTION_EXPLORE) => {
                let target = self.resolve(&self.config.explore_url)?;
                let clients = platform.clients().await?;
                let existing = clients.into_iter().find(|c| same_page(&c.url, &target));
                self.focus_or_open(existing, &target, platform).await
            }
            other => {
                if let Some(action) = other.filter(|a| !a.is_empty()) {
                    tracing::debug!(action, "unknown notification action, treating as body click");
                }
                let root = self.resolve("/")?;
                let clients = platform.clients().await?;
                let existing = pick_origin_client(clients, &self.origin);
                self.focus_or_open(existing, &root, platform).await
            }
        }
    }

    async fn focus_or_open(
        &self, existing: Option<ClientInfo>, target: &Url, platform: &dyn Platform,
    ) -> Result<ClickOutcome, Error> {
        match existing {
            Some(client) => {
                platform.focus(&client.id).await?;
                Ok(ClickOutcome::Focused { client_id: client.id })
            }
            None => {
                let client = platform.open_window(target.as_str()).await?;
                Ok(ClickOutcome::Opened { client_id: client.id, url: target.to_string() })
            }
        }
    }

    fn resolve(&self, path: &str) -> Result<Url, Error> {
        self.origin.join(path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))
    }
}

fn same_page(client_url: &str, target: &Url) -> bool {
    Url::parse(client_url)
        .map(|url| url.origin() == target.origin() && url.path() == target.path())
        .unwrap_or(false)
}

/// An open window at `origin`, preferring the focused one.
fn pick_origin_client(clients: Vec<ClientInfo>, origin: &Url) -> Option<ClientInfo> {
    let mut at_origin: Vec<ClientInfo> = clients
        .into_iter()
        .filter(|c| Url::parse(&c.url).map(|u| u.origin() == origin.origin()).unwrap_or(false))
        .collect();
    let focused = at_origin.iter().position(|c| c.focused);
    match focused {
        Some(index) => Some(at_origin.swap_remove(index)),
        None => at_origin.into_iter().next(),
    }
}
