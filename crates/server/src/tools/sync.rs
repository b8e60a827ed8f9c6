//! sw_sync and sw_message tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use satchel_worker::{Event, EventOutcome, ServiceWorker, dispatch};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{json_result, unexpected};

/// Input parameters for sw_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwSyncParams {
    /// Sync tag: "background-sync-grades" or "background-sync-notifications".
    pub tag: String,
}

/// Input parameters for sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwMessageParams {
    /// Message posted by a client, e.g. {"type": "SKIP_WAITING"} or {"type": "GET_VERSION"}.
    pub data: serde_json::Value,
}

/// Fire a background sync. Failures are reported, not retried.
pub async fn sync_impl(worker: &ServiceWorker, params: SwSyncParams) -> Result<CallToolResult, McpError> {
    match dispatch(worker, Event::Sync { tag: params.tag }).await {
        EventOutcome::Synced(report) => json_result(&report),
        other => Err(unexpected(other)),
    }
}

pub async fn message_impl(worker: &ServiceWorker, params: SwMessageParams) -> Result<CallToolResult, McpError> {
    match dispatch(worker, Event::Message(params.data)).await {
        EventOutcome::Replied(reply) => json_result(&reply),
        other => Err(unexpected(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{offline_worker, output};

    #[tokio::test]
    async fn test_sync_unknown_tag() {
        let worker = offline_worker().await;
        let err = sync_impl(&worker, SwSyncParams { tag: "background-sync-exams".into() }).await.unwrap_err();
        assert_eq!(err.code.0, -32011);
    }

    #[tokio::test]
    async fn test_sync_without_generation() {
        let worker = offline_worker().await;
        let err = sync_impl(&worker, SwSyncParams { tag: "background-sync-grades".into() }).await.unwrap_err();
        assert_eq!(err.code.0, -32013);
    }

    #[tokio::test]
    async fn test_get_version() {
        let worker = offline_worker().await;
        let params = SwMessageParams { data: serde_json::json!({"type": "GET_VERSION"}) };

        let out = output(&message_impl(&worker, params).await.unwrap());

        assert_eq!(out["type"], "VERSION");
        assert_eq!(out["version"], "student-portal-v1.0.0");
    }

    #[tokio::test]
    async fn test_unknown_message() {
        let worker = offline_worker().await;
        let params = SwMessageParams { data: serde_json::json!({"kind": "ping"}) };
        let err = message_impl(&worker, params).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }
}
