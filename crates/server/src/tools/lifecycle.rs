//! sw_install, sw_activate and sw_status tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use satchel_worker::{Event, EventOutcome, ServiceWorker, dispatch};

use super::{json_result, unexpected};

/// Deliver the install event: precache the manifest into this version's generation.
pub async fn install_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    match dispatch(worker, Event::Install).await {
        EventOutcome::Installed(report) => json_result(&report),
        other => Err(unexpected(other)),
    }
}

/// Deliver the activate event: promote, drop stale generations, claim clients.
pub async fn activate_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    match dispatch(worker, Event::Activate).await {
        EventOutcome::Activated(report) => json_result(&report),
        other => Err(unexpected(other)),
    }
}

pub async fn status_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let status = worker.status().await?;
    json_result(&status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{offline_worker, output};

    #[tokio::test]
    async fn test_install_offline_fails_with_precache_code() {
        let worker = offline_worker().await;

        let err = install_impl(&worker).await.unwrap_err();
        assert_eq!(err.code.0, -32009);

        let result = status_impl(&worker).await.unwrap();
        let status = output(&result);
        assert_eq!(status["state"], "redundant");
        assert_eq!(status["current_generation"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_activate_before_install() {
        let worker = offline_worker().await;
        let err = activate_impl(&worker).await.unwrap_err();
        assert_eq!(err.code.0, -32010);
    }

    #[tokio::test]
    async fn test_status_fresh() {
        let worker = offline_worker().await;
        let status = output(&status_impl(&worker).await.unwrap());
        assert_eq!(status["version"], "student-portal-v1.0.0");
        assert_eq!(status["state"], "parsed");
        assert_eq!(status["generations"].as_array().unwrap().len(), 0);
    }
}
