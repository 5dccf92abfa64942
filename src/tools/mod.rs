//! Built-in tools registered at startup.
//!
//! Two tools ship with the bridge: `echo` for connectivity checks, and
//! `server_status` for diagnostics. The status tool reads real measured
//! values from the shared server state and error tracker.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ErrorTracker;
use crate::mcp::server::ServerStatus;
use crate::registry::{
    Tool, ToolCategory, ToolContext, ToolError, ToolInputSchema, ToolMetadata,
};

/// Returns the message it was given. Useful for connectivity checks.
pub struct EchoTool {
    meta: ToolMetadata,
}

impl EchoTool {
    /// Creates the echo tool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: ToolMetadata::new(
                "echo",
                ToolCategory::Basic,
                "Echo a message back to the caller",
            )
            .without_auth(),
        }
    }
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.meta
    }

    fn metadata_mut(&mut self) -> &mut ToolMetadata {
        &mut self.meta
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::object().required_property(
            "message",
            json!({
                "type": "string",
                "description": "Message to echo back"
            }),
        )
    }

    async fn execute(&self, arguments: &Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::new("message must be a string"))?;

        Ok(Value::String(message.to_string()))
    }
}

/// Reports server health from measured state: uptime, request counters, and
/// error bookkeeping.
pub struct ServerStatusTool {
    meta: ToolMetadata,
    status: Arc<ServerStatus>,
    tracker: Arc<ErrorTracker>,
}

impl ServerStatusTool {
    /// Creates the status tool around the shared server state.
    #[must_use]
    pub fn new(status: Arc<ServerStatus>, tracker: Arc<ErrorTracker>) -> Self {
        Self {
            meta: ToolMetadata::new(
                "server_status",
                ToolCategory::Diagnostic,
                "Report server uptime, request counters, and error statistics",
            )
            .without_auth(),
            status,
            tracker,
        }
    }
}

#[async_trait]
impl Tool for ServerStatusTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.meta
    }

    fn metadata_mut(&mut self) -> &mut ToolMetadata {
        &mut self.meta
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::object().property(
            "include_errors",
            json!({
                "type": "boolean",
                "description": "Include the recent error log (default: false)"
            }),
        )
    }

    async fn execute(&self, arguments: &Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let include_errors = arguments
            .get("include_errors")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut report = self.status.snapshot();

        if include_errors {
            if let Some(map) = report.as_object_mut() {
                map.insert("errors".to_string(), self.tracker.stats());
            }
        }

        Ok(report)
    }
}
