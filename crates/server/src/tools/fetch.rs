//! sw_fetch tool implementation.
//!
//! Delivers one intercepted request to the agent and reports how it was
//! classified, which strategy ran and what the page would receive.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use satchel_client::{Request, RequestMode, ResponseSource};
use satchel_worker::{Event, EventOutcome, FetchOutcome, RequestClass, ServiceWorker, dispatch};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{json_result, unexpected};
use crate::error::ToolError;

/// Input parameters for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Request mode: "navigate", "same-origin", "cors" (default) or "no-cors".
    #[serde(default)]
    pub mode: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// The response as the page would see it.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseView {
    pub status: u16,
    pub source: ResponseSource,
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
    pub fetch_ms: u64,
}

/// Output structure for sw_fetch tool.
#[derive(Debug, Clone, Serialize)]
pub struct SwFetchOutput {
    pub url: String,
    pub class: RequestClass,
    pub strategy: String,
    /// True when the agent declined and the request goes to the network untouched.
    pub passthrough: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseView>,
}

fn parse_mode(mode: Option<&str>) -> Result<RequestMode, ToolError> {
    match mode {
        None => Ok(RequestMode::default()),
        Some(mode) => serde_json::from_value(serde_json::Value::String(mode.to_string()))
            .map_err(|_| ToolError::InvalidInput(format!("unknown request mode {mode:?}"))),
    }
}

/// Implementation of the sw_fetch tool.
pub async fn fetch_impl(worker: &ServiceWorker, params: SwFetchParams) -> Result<CallToolResult, McpError> {
    let mode = parse_mode(params.mode.as_deref())?;
    let request = Request::parse(&params.method, &params.url, Some(worker.origin()))?.with_mode(mode);
    let url = request.url.to_string();

    let intercepted = match dispatch(worker, Event::Fetch(request)).await {
        EventOutcome::Fetched(intercepted) => intercepted,
        other => return Err(unexpected(other)),
    };

    let response = match intercepted.outcome {
        FetchOutcome::Respond(response) => Some(response),
        FetchOutcome::Passthrough => None,
    };
    let output = SwFetchOutput {
        url,
        class: intercepted.class,
        strategy: intercepted.policy.name().to_string(),
        passthrough: response.is_none(),
        response: response.map(|response| ResponseView {
            status: response.status.as_u16(),
            source: response.source,
            headers: response.snapshot().headers,
            body: response.text(),
            fetch_ms: response.fetch_ms,
        }),
    };

    json_result(&output)
}
