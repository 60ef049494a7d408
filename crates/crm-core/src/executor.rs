//! Turn executor: runs the tool calls of one assistant message.
//!
//! Every call produces exactly one [`ToolResult`], in the order the calls
//! were issued. A failing call never stops the ones after it.

use crate::error::AgentError;
use crate::tool_registry::ToolRegistry;
use crate::types::{FailureKind, ToolCall, ToolResult};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sent back when a call's argument string is not a JSON object.
pub const INVALID_ARGUMENTS_MESSAGE: &str =
    "Error: Invalid JSON passed to tool. Please return ONLY valid JSON.";

pub struct TurnExecutor {
    registry: Arc<ToolRegistry>,
}

impl TurnExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute `calls` sequentially in source order.
    pub async fn execute(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute_call(call).await);
        }
        results
    }

    /// Execute a single call. Never fails: every outcome becomes a result.
    pub async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        let args = match parse_arguments(&call.arguments) {
            Ok(args) => args,
            Err(reason) => {
                debug!(tool = %call.name, call_id = %call.id, "Rejecting tool arguments: {}", reason);
                return ToolResult::failure(
                    &call.id,
                    &call.name,
                    FailureKind::InvalidArguments,
                    INVALID_ARGUMENTS_MESSAGE,
                );
            }
        };

        let tool = match self.registry.lookup(&call.name) {
            Ok(tool) => tool.clone(),
            Err(e) => {
                warn!(call_id = %call.id, "{}", e);
                return ToolResult::failure(
                    &call.id,
                    &call.name,
                    e.failure_kind(),
                    format!("Error: Tool '{}' not found.", call.name),
                );
            }
        };

        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        match AssertUnwindSafe(tool.execute(args)).catch_unwind().await {
            Ok(Ok(content)) => ToolResult::success(&call.id, &call.name, content),
            Ok(Err(e)) => {
                warn!(tool = %call.name, call_id = %call.id, "Tool failed: {}", e);
                ToolResult::failure(&call.id, &call.name, e.failure_kind(), render_failure(&e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = %call.name, call_id = %call.id, "Tool panicked: {}", message);
                ToolResult::failure(
                    &call.id,
                    &call.name,
                    FailureKind::Execution,
                    format!("Error running tool: {}", message),
                )
            }
        }
    }

    /// Result for a call that was never started because the client left.
    pub fn cancelled(call: &ToolCall) -> ToolResult {
        ToolResult::failure(
            &call.id,
            &call.name,
            FailureKind::Cancelled,
            "Error: Tool call cancelled before execution.",
        )
    }
}

/// Parse a model-produced argument string. Only JSON objects are accepted.
fn parse_arguments(raw: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_type(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Transport errors already carry their tag in their text.
fn render_failure(e: &AgentError) -> String {
    match e {
        AgentError::Api { .. } | AgentError::Connection { .. } => e.to_string(),
        AgentError::InvalidArguments { .. } => format!("Error: {}", e),
        _ => format!("Error running tool: {}", e),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}
