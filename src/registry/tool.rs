//! Tool descriptors: metadata, input schemas, and the `Tool` trait.
//!
//! Tools are declarative: each one provides its metadata and a JSON schema
//! for its arguments directly, and the registry validates calls against that
//! schema before execution. There is no runtime introspection of function
//! signatures.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Category a tool belongs to, used for listing and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Core operations.
    Basic,
    /// Tools that forward to external services.
    Integration,
    /// Health and statistics reporting.
    Diagnostic,
    /// Administrative operations.
    Maintenance,
}

impl ToolCategory {
    /// Every category, in display order.
    pub const ALL: [Self; 4] = [
        Self::Basic,
        Self::Integration,
        Self::Diagnostic,
        Self::Maintenance,
    ];

    /// Returns the wire name of this category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Integration => "integration",
            Self::Diagnostic => "diagnostic",
            Self::Maintenance => "maintenance",
        }
    }
}

/// Per-tool metadata, fixed at registration except for the enabled flag.
#[derive(Debug, Clone)]
pub struct ToolMetadata {
    /// Unique tool name (registry key).
    pub name: String,
    /// Category for listing and filtering.
    pub category: ToolCategory,
    /// Human-readable description.
    pub description: String,
    /// Whether calls must pass the authentication gate.
    pub requires_auth: bool,
    /// Maximum calls per minute, if limited.
    pub rate_limit: Option<u32>,
    /// Execution deadline for a single call.
    pub timeout: Duration,
    /// Whether the tool accepts calls.
    pub enabled: bool,
}

impl ToolMetadata {
    /// Default execution deadline.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates metadata with defaults: auth required, no rate limit,
    /// 30 second timeout, enabled.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        category: ToolCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            description: description.into(),
            requires_auth: true,
            rate_limit: None,
            timeout: Self::DEFAULT_TIMEOUT,
            enabled: true,
        }
    }

    /// Marks the tool as callable without authentication.
    #[must_use]
    pub const fn without_auth(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// Limits the tool to `calls_per_minute` within the rate window.
    #[must_use]
    pub const fn with_rate_limit(mut self, calls_per_minute: u32) -> Self {
        self.rate_limit = Some(calls_per_minute);
        self
    }

    /// Overrides the execution deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// JSON schema describing a tool's arguments.
///
/// Always an object schema; `properties` maps argument names to their JSON
/// Schema fragments and `required` lists mandatory arguments.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInputSchema {
    /// Always "object".
    #[serde(rename = "type")]
    pub schema_type: &'static str,
    /// Argument name to schema fragment.
    pub properties: Map<String, Value>,
    /// Names of mandatory arguments.
    pub required: Vec<String>,
    /// Whether undeclared arguments are accepted.
    #[serde(rename = "additionalProperties")]
    pub additional_properties: bool,
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self::object()
    }
}

impl ToolInputSchema {
    /// Creates an empty object schema.
    #[must_use]
    pub fn object() -> Self {
        Self {
            schema_type: "object",
            properties: Map::new(),
            required: Vec::new(),
            additional_properties: false,
        }
    }

    /// Adds an optional property.
    #[must_use]
    pub fn property(mut self, name: &str, schema: Value) -> Self {
        self.properties.insert(name.to_string(), schema);
        self
    }

    /// Adds a mandatory property.
    #[must_use]
    pub fn required_property(mut self, name: &str, schema: Value) -> Self {
        self.properties.insert(name.to_string(), schema);
        self.required.push(name.to_string());
        self
    }

    /// Validates arguments against this schema.
    ///
    /// Checks that every required argument is present and that present
    /// arguments match their declared JSON type.
    ///
    /// # Errors
    ///
    /// Returns a message naming the offending argument.
    pub fn validate(&self, arguments: &Value) -> Result<(), String> {
        let empty = Map::new();
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err("arguments must be an object".to_string()),
        };

        for required in &self.required {
            if !args.contains_key(required) {
                return Err(format!("missing required parameter '{required}'"));
            }
        }

        for (name, schema) in &self.properties {
            let Some(value) = args.get(name) else {
                continue;
            };
            let Some(expected) = schema.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(format!("parameter '{name}' must be of type {expected}"));
            }
        }

        Ok(())
    }
}

/// Checks a JSON value against a declared schema type name.
fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        // Undeclared type names are not enforced
        _ => true,
    }
}

/// Public tool definition, as returned by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolInputSchema,
}

/// Content item in a tool call result.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// The business-level outcome of a tool call.
///
/// A failing tool (unknown, disabled, rate limited, invalid arguments,
/// timeout, execution error) is a *successful* JSON-RPC response carrying
/// `isError: true`; only transport and routing failures become protocol
/// errors.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Returns the first text content item, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|item| match item {
            ToolContent::Text { text } => text.as_str(),
        })
    }
}

/// A failure raised by a tool's own execution.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct ToolError(pub String);

impl ToolError {
    /// Creates a new execution failure.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Per-call context handed to tools by the dispatcher.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// When the call was dispatched.
    pub timestamp: DateTime<Utc>,
    /// Whether the caller passed the authentication gate.
    pub authenticated: bool,
}

impl ToolContext {
    /// Creates a context stamped with the current time.
    #[must_use]
    pub fn new(authenticated: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            authenticated,
        }
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Cumulative execution statistics for one tool.
///
/// Counters are monotonically non-decreasing; the average is recomputed
/// after every update. Durations are in seconds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionStats {
    /// Calls that reached execution.
    pub total_calls: u64,
    /// Calls whose execution returned a value.
    pub successful_calls: u64,
    /// Calls that timed out or returned an error.
    pub failed_calls: u64,
    /// Sum of execution durations, in seconds.
    pub total_execution_time: f64,
    /// `total_execution_time / total_calls`, in seconds.
    pub average_execution_time: f64,
}

impl ExecutionStats {
    /// Folds one execution into the counters.
    pub fn update(&mut self, execution_time: Duration, success: bool) {
        self.total_calls += 1;
        self.total_execution_time += execution_time.as_secs_f64();

        if success {
            self.successful_calls += 1;
        } else {
            self.failed_calls += 1;
        }

        #[allow(clippy::cast_precision_loss)] // call counts stay far below 2^52
        {
            self.average_execution_time = self.total_execution_time / self.total_calls as f64;
        }
    }
}

/// A named, independently invocable operation.
///
/// Implementations provide their metadata and input schema declaratively;
/// the registry owns enablement, rate limiting, validation, timeouts, and
/// statistics around `execute`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's metadata.
    fn metadata(&self) -> &ToolMetadata;

    /// Returns the tool's metadata for in-place mutation (enable/disable).
    fn metadata_mut(&mut self) -> &mut ToolMetadata;

    /// Returns the JSON schema for the tool's arguments.
    fn input_schema(&self) -> ToolInputSchema;

    /// Executes the tool.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] describing the business failure; the registry
    /// turns it into an `isError` outcome.
    async fn execute(&self, arguments: &Value, ctx: &ToolContext) -> Result<Value, ToolError>;

    /// Returns the public definition, as served by `tools/list`.
    fn definition(&self) -> ToolDefinition {
        let meta = self.metadata();
        ToolDefinition {
            name: meta.name.clone(),
            description: meta.description.clone(),
            input_schema: self.input_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_defaults() {
        let meta = ToolMetadata::new("sample", ToolCategory::Basic, "a sample tool");
        assert!(meta.requires_auth);
        assert!(meta.enabled);
        assert!(meta.rate_limit.is_none());
        assert_eq!(meta.timeout, ToolMetadata::DEFAULT_TIMEOUT);
    }

    #[test]
    fn metadata_builders() {
        let meta = ToolMetadata::new("sample", ToolCategory::Basic, "a sample tool")
            .without_auth()
            .with_rate_limit(5)
            .with_timeout(Duration::from_secs(1));
        assert!(!meta.requires_auth);
        assert_eq!(meta.rate_limit, Some(5));
        assert_eq!(meta.timeout, Duration::from_secs(1));
    }

    #[test]
    fn schema_serialises_with_wire_names() {
        let schema = ToolInputSchema::object()
            .required_property("text", json!({"type": "string"}))
            .property("count", json!({"type": "number"}));

        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["type"], "object");
        assert_eq!(value["additionalProperties"], false);
        assert_eq!(value["required"], json!(["text"]));
        assert_eq!(value["properties"]["count"]["type"], "number");
    }

    #[test]
    fn validate_missing_required() {
        let schema = ToolInputSchema::object().required_property("x", json!({"type": "number"}));

        let err = schema.validate(&json!({})).unwrap_err();
        assert!(err.contains('x'));
    }

    #[test]
    fn validate_type_mismatch_names_field() {
        let schema = ToolInputSchema::object()
            .required_property("a", json!({"type": "integer"}))
            .required_property("b", json!({"type": "integer"}));

        let err = schema.validate(&json!({"a": "x", "b": 1})).unwrap_err();
        assert!(err.contains('a'));
        assert!(err.contains("integer"));
    }

    #[test]
    fn validate_accepts_matching_types() {
        let schema = ToolInputSchema::object()
            .required_property("s", json!({"type": "string"}))
            .property("n", json!({"type": "number"}))
            .property("b", json!({"type": "boolean"}))
            .property("arr", json!({"type": "array"}))
            .property("obj", json!({"type": "object"}));

        let args = json!({
            "s": "hello",
            "n": 1.5,
            "b": true,
            "arr": [1, 2],
            "obj": {"k": "v"}
        });
        assert!(schema.validate(&args).is_ok());
    }

    #[test]
    fn validate_null_arguments_with_no_required() {
        let schema = ToolInputSchema::object().property("opt", json!({"type": "string"}));
        assert!(schema.validate(&Value::Null).is_ok());
    }

    #[test]
    fn boolean_is_not_a_number() {
        let schema = ToolInputSchema::object().property("n", json!({"type": "number"}));
        assert!(schema.validate(&json!({"n": true})).is_err());
    }

    #[test]
    fn stats_average_recomputed() {
        let mut stats = ExecutionStats::default();
        stats.update(Duration::from_secs(2), true);
        stats.update(Duration::from_secs(4), false);

        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.successful_calls, 1);
        assert_eq!(stats.failed_calls, 1);
        assert!((stats.total_execution_time - 6.0).abs() < f64::EPSILON);
        assert!((stats.average_execution_time - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn result_serialises_is_error() {
        let ok = serde_json::to_value(ToolCallResult::text("fine")).unwrap();
        assert_eq!(ok["isError"], false);
        assert_eq!(ok["content"][0]["type"], "text");
        assert_eq!(ok["content"][0]["text"], "fine");

        let err = serde_json::to_value(ToolCallResult::error("broken")).unwrap();
        assert_eq!(err["isError"], true);
    }
}
