//! sw_push and sw_notification_click tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use satchel_worker::notify::NOTIFICATION_TAG;
use satchel_worker::{Event, EventOutcome, NotificationClick, ServiceWorker, dispatch};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{json_result, unexpected};

/// Input parameters for sw_push tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SwPushParams {
    /// Raw push payload, normally a JSON object with optional `title` and `body`.
    /// Missing or unparseable payloads fall back to the default notification text.
    #[serde(default)]
    pub payload: Option<String>,
}

/// Input parameters for sw_notification_click tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SwNotificationClickParams {
    /// Tag of the clicked notification (default: the push notification tag).
    #[serde(default)]
    pub tag: Option<String>,

    /// Pressed action: "explore", "close", or omitted for a click on the body.
    #[serde(default)]
    pub action: Option<String>,
}

pub async fn push_impl(worker: &ServiceWorker, params: SwPushParams) -> Result<CallToolResult, McpError> {
    match dispatch(worker, Event::Push { payload: params.payload }).await {
        EventOutcome::NotificationShown(notification) => json_result(&notification),
        other => Err(unexpected(other)),
    }
}

pub async fn click_impl(
    worker: &ServiceWorker, params: SwNotificationClickParams,
) -> Result<CallToolResult, McpError> {
    let click = NotificationClick {
        tag: params.tag.unwrap_or_else(|| NOTIFICATION_TAG.to_string()),
        action: params.action.filter(|a| !a.is_empty()),
    };
    match dispatch(worker, Event::NotificationClick(click)).await {
        EventOutcome::NotificationClicked(outcome) => json_result(&outcome),
        other => Err(unexpected(other)),
    }
}
