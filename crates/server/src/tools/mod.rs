//! MCP tool implementations.
//!
//! Every `sw_*` tool delivers one event to the agent through
//! [`satchel_worker::dispatch`]; the `cache_*` tools inspect and maintain the
//! store directly.

pub mod cache;
pub mod fetch;
pub mod lifecycle;
pub mod notify;
pub mod sync;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use satchel_worker::EventOutcome;
use serde::Serialize;

use crate::error::ToolError;

/// Pretty-printed JSON text content.
pub fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::SerializeFailed(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Error for an outcome the calling tool did not ask for.
///
/// A failed event keeps its agent error code.
pub fn unexpected(outcome: EventOutcome) -> McpError {
    match outcome {
        EventOutcome::Failed { error, .. } => error.into(),
        other => ToolError::UnexpectedOutcome(format!("{other:?}")).into(),
    }
}
