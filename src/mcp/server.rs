//! MCP server: request dispatch and lifecycle.
//!
//! This module implements the server side of the protocol bridge:
//!
//! 1. **Initialisation**: capability negotiation via `initialize`
//! 2. **Operation**: routing requests to tools, resources, and prompts
//! 3. **Shutdown**: EOF or a termination signal ends the loop and releases
//!    the auth session
//!
//! # Dispatch model
//!
//! The loop is strictly sequential: one message is fully dispatched,
//! including any tool execution, before the next line is read. Responses are
//! therefore emitted in request order. Registry and status mutation only
//! happens from this single path.
//!
//! # Failure layering
//!
//! Transport, parsing, and routing failures surface as JSON-RPC `error`
//! objects; tool failures surface as successful responses with
//! `result.isError == true`. The two never mix.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::auth::AuthProvider;
use crate::config::Config;
use crate::error::{ErrorTracker, ServerError};
use crate::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, MCP_PROTOCOL_VERSION,
};
use crate::mcp::transport::{LineTransport, StdioTransport};
use crate::registry::{ToolContext, ToolRegistry};

/// Process-wide server state and counters.
///
/// Shared with diagnostic consumers (the `stats://server` resource and the
/// `server_status` tool), which read real measured values from here.
#[derive(Debug)]
pub struct ServerStatus {
    started_at: DateTime<Utc>,
    initialized: AtomicBool,
    running: AtomicBool,
    request_count: AtomicU64,
    error_count: AtomicU64,
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStatus {
    /// Creates fresh state stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    /// Marks the server as initialised. Flips once; repeats are no-ops.
    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Relaxed);
    }

    /// Returns whether `initialize` has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }

    /// Sets the running flag.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    /// Returns whether the message loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Counts one received message.
    pub fn count_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one protocol-level error.
    pub fn count_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns seconds since process start.
    #[must_use]
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Returns a read-only snapshot for diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let requests = self.request_count.load(Ordering::Relaxed);
        let errors = self.error_count.load(Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)] // counters stay far below 2^52
        let success_rate = if requests > 0 {
            (requests.saturating_sub(errors)) as f64 / requests as f64
        } else {
            0.0
        };

        json!({
            "status": {
                "initialized": self.is_initialized(),
                "running": self.is_running(),
                "uptime_seconds": self.uptime_seconds(),
                "start_time": self.started_at.to_rfc3339(),
            },
            "requests": {
                "total_requests": requests,
                "error_count": errors,
                "success_rate": success_rate,
            },
        })
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeParams {
    /// Protocol version requested by the client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    pub client_info: ClientInfo,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// An outgoing message produced for one request.
#[derive(Debug, Clone)]
pub enum Outgoing {
    /// A successful response (including tool outcomes with `isError`).
    Response(JsonRpcResponse),
    /// A protocol-level error response.
    Error(JsonRpcError),
}

impl Outgoing {
    /// Serialises this message to a single JSON line (without newline).
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Self::Response(resp) => serde_json::to_string(resp),
            Self::Error(err) => serde_json::to_string(err),
        }
    }
}

/// The MCP protocol bridge server.
///
/// All collaborators are constructed once at startup and passed in
/// explicitly; there is no process-global state.
pub struct McpServer {
    /// Identity advertised in `server_info`.
    server_name: String,
    server_version: String,
    server_description: String,
    /// Tool registry (descriptors, rate limiters, statistics).
    registry: ToolRegistry,
    /// Authentication gate for guarded tools.
    auth: Box<dyn AuthProvider>,
    /// Error bookkeeping, shared with diagnostics.
    tracker: Arc<ErrorTracker>,
    /// Process-wide state and counters, shared with diagnostics.
    status: Arc<ServerStatus>,
    /// Client capabilities captured during initialisation.
    client_capabilities: Option<Value>,
    /// Sanitised configuration snapshot served as `config://settings`.
    safe_config: Value,
}

impl McpServer {
    /// Creates a server from its collaborators.
    #[must_use]
    pub fn new(
        config: &Config,
        registry: ToolRegistry,
        auth: Box<dyn AuthProvider>,
        tracker: Arc<ErrorTracker>,
        status: Arc<ServerStatus>,
    ) -> Self {
        info!(
            server_name = %config.server.name,
            version = %config.server.version,
            "MCP server initialised"
        );

        let safe_config = json!({
            "server": {
                "name": &config.server.name,
                "version": &config.server.version,
                "description": &config.server.description,
                "protocol_version": MCP_PROTOCOL_VERSION,
            },
            "auth": {
                "has_api_key": config.auth.api_key.is_some(),
            },
            "logging": {
                "level": &config.logging.level,
            },
        });

        Self {
            server_name: config.server.name.clone(),
            server_version: config.server.version.clone(),
            server_description: config.server.description.clone(),
            registry,
            auth,
            tracker,
            status,
            client_capabilities: None,
            safe_config,
        }
    }

    /// Returns the shared server status.
    #[must_use]
    pub fn status(&self) -> &Arc<ServerStatus> {
        &self.status
    }

    /// Returns the tool registry.
    #[must_use]
    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Returns the tool registry for mutation (registration, enablement).
    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    /// Runs the server over stdio with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> io::Result<()> {
        self.status.set_running(true);
        let mut transport = StdioTransport::stdio();
        let result = self.run_with_shutdown(&mut transport).await;
        self.shutdown().await;
        result
    }

    /// Runs the main loop until EOF or a termination signal.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("received SIGINT, initiating graceful shutdown");
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = transport.read_line() => {
                    if self.dispatch_transport_result(transport, line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop until EOF or Ctrl+C.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("received Ctrl+C, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = transport.read_line() => {
                    if self.dispatch_transport_result(transport, line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Drives the message loop over an arbitrary transport until EOF.
    ///
    /// Used by tests with in-memory pipes; `run` adds signal handling on
    /// top of the same per-line dispatch.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve<R, W>(&mut self, transport: &mut LineTransport<R, W>) -> io::Result<()>
    where
        R: tokio::io::AsyncBufRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin,
    {
        self.status.set_running(true);
        loop {
            let line_result = transport.read_line().await;
            if self.dispatch_transport_result(transport, line_result).await? {
                return Ok(());
            }
        }
    }

    /// Handles the result of one transport read.
    ///
    /// Returns `true` when the loop should stop (EOF).
    async fn dispatch_transport_result<R, W>(
        &mut self,
        transport: &mut LineTransport<R, W>,
        line_result: io::Result<Option<String>>,
    ) -> io::Result<bool>
    where
        R: tokio::io::AsyncBufRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin,
    {
        let Some(line) = line_result? else {
            debug!("input stream closed, stopping message loop");
            return Ok(true);
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        if let Some(outgoing) = self.handle_line(&line).await {
            match &outgoing {
                Outgoing::Response(resp) => transport.write_response(resp).await?,
                Outgoing::Error(err) => transport.write_error(err).await?,
            }
        }

        Ok(false)
    }

    /// Stops the server and releases owned resources.
    pub async fn shutdown(&mut self) {
        if !self.status.is_running() {
            return;
        }
        self.status.set_running(false);
        self.auth.logout().await;
        info!("MCP server shut down");
    }

    /// Dispatches one input line.
    ///
    /// Returns the response to emit, or `None` for notifications. Exactly
    /// one `Outgoing` is produced per request, carrying the request's `id`
    /// whenever it could be recovered.
    pub async fn handle_line(&mut self, line: &str) -> Option<Outgoing> {
        self.status.count_request();

        match parse_message(line) {
            Ok(IncomingMessage::Request(req)) => Some(self.handle_request(req).await),
            Ok(IncomingMessage::Notification(notif)) => {
                self.handle_notification(&notif);
                None
            }
            Err(error) => {
                self.status.count_error();
                self.tracker
                    .record_raw("Protocol", &error.error.message);
                warn!(code = error.error.code, "rejected malformed message");
                Some(Outgoing::Error(error))
            }
        }
    }

    /// Routes a request to its handler and wraps the outcome.
    async fn handle_request(&mut self, req: JsonRpcRequest) -> Outgoing {
        debug!(method = %req.method, request_id = %req.id, "handling request");

        let outcome = match req.method.as_str() {
            "initialize" => self.handle_initialize(req.params.as_ref()),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(req.params.as_ref()).await,
            "resources/list" => Ok(Self::handle_resources_list()),
            "resources/read" => self.handle_resources_read(req.params.as_ref()),
            "prompts/list" => Ok(Self::handle_prompts_list()),
            "prompts/get" => Self::handle_prompts_get(req.params.as_ref()),
            other => {
                self.status.count_error();
                self.tracker
                    .record_raw("MethodNotFound", &format!("unknown method: {other}"));
                return Outgoing::Error(JsonRpcError::method_not_found(req.id, other));
            }
        };

        match outcome {
            Ok(result) => Outgoing::Response(JsonRpcResponse::success(req.id, result)),
            Err(err) => {
                self.status.count_error();
                self.tracker.record(&err);
                Outgoing::Error(JsonRpcError::new(Some(req.id), err.to_error_data()))
            }
        }
    }

    /// Handles an incoming notification. Only logged; never answered.
    fn handle_notification(&self, notif: &JsonRpcNotification) {
        debug!(method = %notif.method, "received notification");
    }

    /// Ensures `initialize` has completed.
    fn require_initialized(&self) -> Result<(), ServerError> {
        if self.status.is_initialized() {
            Ok(())
        } else {
            Err(ServerError::Internal("server not initialised".to_string()))
        }
    }

    // ========================================================================
    // Request handlers
    // ========================================================================

    fn handle_initialize(&mut self, params: Option<&Value>) -> Result<Value, ServerError> {
        let params: InitializeParams = parse_params(params, "initialize")?;

        self.client_capabilities = Some(params.capabilities);
        self.status.mark_initialized();

        info!(
            client = %params.client_info.name,
            client_version = params.client_info.version.as_deref().unwrap_or("unknown"),
            protocol_version = %params.protocol_version,
            "initialisation complete"
        );

        Ok(json!({
            "protocol_version": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {"supports_listing": true, "supports_calling": true},
                "resources": {"supports_listing": true, "supports_reading": true},
                "prompts": {"supports_listing": true, "supports_getting": true},
            },
            "server_info": {
                "name": &self.server_name,
                "version": &self.server_version,
                "description": &self.server_description,
            },
        }))
    }

    fn handle_tools_list(&self) -> Result<Value, ServerError> {
        self.require_initialized()?;

        let tools = self.registry.list(None, true);
        debug!(tool_count = tools.len(), "listing tools");

        Ok(json!({ "tools": tools }))
    }

    async fn handle_tools_call(&mut self, params: Option<&Value>) -> Result<Value, ServerError> {
        self.require_initialized()?;

        let params: ToolCallParams = parse_params(params, "tools/call")?;

        // Auth gate: between lookup and execution, for guarded tools only.
        // Unknown tools fall through to the pipeline's existence check.
        if let Some(tool) = self.registry.get(&params.name) {
            if tool.metadata().requires_auth && !self.auth.is_authenticated() {
                self.auth.authenticate().await?;
            }
        }

        info!(tool_name = %params.name, "dispatching tool call");

        let ctx = ToolContext::new(self.auth.is_authenticated());
        let result = self
            .registry
            .call_tool(&params.name, &params.arguments, &ctx)
            .await;

        serde_json::to_value(&result)
            .map_err(|e| ServerError::Internal(format!("failed to serialise tool result: {e}")))
    }

    fn handle_resources_list() -> Value {
        json!({
            "resources": [
                {
                    "uri": "config://settings",
                    "name": "Server configuration",
                    "description": "Sanitised server configuration",
                    "mimeType": "application/json",
                },
                {
                    "uri": "stats://server",
                    "name": "Server statistics",
                    "description": "Uptime, request counters, and error bookkeeping",
                    "mimeType": "application/json",
                },
                {
                    "uri": "stats://tools",
                    "name": "Tool statistics",
                    "description": "Per-tool execution statistics",
                    "mimeType": "application/json",
                },
            ]
        })
    }

    fn handle_resources_read(&self, params: Option<&Value>) -> Result<Value, ServerError> {
        let uri = params
            .and_then(|p| p.get("uri"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let content = match uri {
            "config://settings" => self.safe_config.clone(),
            "stats://server" => self.server_stats(),
            "stats://tools" => self.registry.all_stats(),
            other => {
                return Err(ServerError::ResourceNotFound {
                    resource_type: "resource".to_string(),
                    resource_id: other.to_string(),
                })
            }
        };

        let text = serde_json::to_string_pretty(&content)
            .map_err(|e| ServerError::Internal(format!("failed to serialise resource: {e}")))?;

        Ok(json!({
            "contents": [
                {
                    "uri": uri,
                    "mimeType": "application/json",
                    "text": text,
                }
            ]
        }))
    }

    fn handle_prompts_list() -> Value {
        json!({
            "prompts": [
                {
                    "name": "diagnose_tool_failures",
                    "description": "Investigate why a tool's calls are failing",
                    "arguments": [
                        {"name": "tool_name", "description": "Tool to investigate", "required": true}
                    ],
                },
                {
                    "name": "summarize_usage",
                    "description": "Summarise server usage from execution statistics",
                    "arguments": [
                        {"name": "focus_area", "description": "Aspect to focus on", "required": false}
                    ],
                },
            ]
        })
    }

    fn handle_prompts_get(params: Option<&Value>) -> Result<Value, ServerError> {
        let name = params
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let arguments = params
            .and_then(|p| p.get("arguments"))
            .cloned()
            .unwrap_or_else(|| json!({}));

        match name {
            "diagnose_tool_failures" => {
                let tool_name = arguments
                    .get("tool_name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");

                Ok(json!({
                    "description": format!("Diagnose failures of tool '{tool_name}'"),
                    "messages": [
                        {
                            "role": "system",
                            "content": {
                                "type": "text",
                                "text": format!(
                                    "You are a diagnostics assistant. Read the stats://tools \
                                     resource and explain why calls to '{tool_name}' are failing."
                                ),
                            }
                        },
                        {
                            "role": "user",
                            "content": {
                                "type": "text",
                                "text": format!(
                                    "Inspect the execution statistics for '{tool_name}' and \
                                     suggest likely causes for its failed calls."
                                ),
                            }
                        }
                    ],
                }))
            }
            "summarize_usage" => {
                let focus = arguments
                    .get("focus_area")
                    .and_then(Value::as_str)
                    .unwrap_or("overall");

                Ok(json!({
                    "description": format!("Summarise server usage ({focus})"),
                    "messages": [
                        {
                            "role": "system",
                            "content": {
                                "type": "text",
                                "text": format!(
                                    "Summarise the stats://server resource with a {focus} focus."
                                ),
                            }
                        }
                    ],
                }))
            }
            other => Err(ServerError::ResourceNotFound {
                resource_type: "prompt".to_string(),
                resource_id: other.to_string(),
            }),
        }
    }

    /// Builds the full server statistics document.
    fn server_stats(&self) -> Value {
        let mut stats = self.status.snapshot();
        if let Some(map) = stats.as_object_mut() {
            map.insert("authentication".to_string(), self.auth.status());
            map.insert("tools".to_string(), self.registry.registry_info());
            map.insert("errors".to_string(), self.tracker.stats());
        }
        stats
    }
}

/// Deserialises request params, mapping failures to invalid-params errors.
fn parse_params<T: serde::de::DeserializeOwned>(
    params: Option<&Value>,
    method: &str,
) -> Result<T, ServerError> {
    let Some(params) = params else {
        return Err(ServerError::InvalidParams {
            field: "params".to_string(),
            message: format!("missing params for {method}"),
        });
    };

    serde_json::from_value(params.clone()).map_err(|e| ServerError::InvalidParams {
        field: "params".to_string(),
        message: format!("invalid params for {method}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AnonymousAuth;
    use crate::registry::{
        Tool, ToolCategory, ToolError, ToolInputSchema, ToolMetadata,
    };
    use async_trait::async_trait;

    struct Echo {
        meta: ToolMetadata,
    }

    impl Echo {
        fn boxed() -> Box<dyn Tool> {
            Box::new(Self {
                meta: ToolMetadata::new("echo", ToolCategory::Basic, "echoes its message")
                    .without_auth(),
            })
        }
    }

    #[async_trait]
    impl Tool for Echo {
        fn metadata(&self) -> &ToolMetadata {
            &self.meta
        }

        fn metadata_mut(&mut self) -> &mut ToolMetadata {
            &mut self.meta
        }

        fn input_schema(&self) -> ToolInputSchema {
            ToolInputSchema::object().required_property("message", json!({"type": "string"}))
        }

        async fn execute(&self, arguments: &Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
            Ok(arguments["message"].clone())
        }
    }

    fn test_server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry.register(Echo::boxed());

        McpServer::new(
            &Config::default(),
            registry,
            Box::new(AnonymousAuth),
            Arc::new(ErrorTracker::new()),
            Arc::new(ServerStatus::new()),
        )
    }

    async fn respond(server: &mut McpServer, line: &str) -> Value {
        let outgoing = server.handle_line(line).await.expect("expected a response");
        serde_json::from_str(&outgoing.to_json().unwrap()).unwrap()
    }

    fn initialize_line(id: u64) -> String {
        format!(
            r#"{{"jsonrpc":"2.0","id":{id},"method":"initialize","params":{{"protocol_version":"2024-11-05","capabilities":{{}},"client_info":{{"name":"t","version":"1"}}}}}}"#
        )
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let mut server = test_server();
        let resp = respond(&mut server, &initialize_line(1)).await;

        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocol_version"], "2024-11-05");
        assert!(resp["result"]["server_info"]["name"].is_string());
        assert!(server.status().is_initialized());
    }

    #[tokio::test]
    async fn tools_list_requires_initialize() {
        let mut server = test_server();
        let resp = respond(&mut server, r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).await;

        assert_eq!(resp["error"]["code"], -32603);
        assert_eq!(resp["id"], 2);
    }

    #[tokio::test]
    async fn tools_call_requires_initialize() {
        let mut server = test_server();
        let resp = respond(
            &mut server,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"echo","arguments":{"message":"x"}}}"#,
        )
        .await;

        assert_eq!(resp["error"]["code"], -32603);
    }

    #[tokio::test]
    async fn resources_do_not_require_initialize() {
        let mut server = test_server();
        let resp = respond(
            &mut server,
            r#"{"jsonrpc":"2.0","id":4,"method":"resources/list"}"#,
        )
        .await;

        assert!(resp["result"]["resources"].is_array());
    }

    #[tokio::test]
    async fn prompts_do_not_require_initialize() {
        let mut server = test_server();
        let resp = respond(
            &mut server,
            r#"{"jsonrpc":"2.0","id":5,"method":"prompts/list"}"#,
        )
        .await;

        assert!(resp["result"]["prompts"].is_array());
    }

    #[tokio::test]
    async fn unknown_method_is_protocol_error() {
        let mut server = test_server();
        let resp = respond(
            &mut server,
            r#"{"jsonrpc":"2.0","id":6,"method":"nope/nothing"}"#,
        )
        .await;

        assert_eq!(resp["error"]["code"], -32601);
        assert!(resp["error"]["message"]
            .as_str()
            .unwrap()
            .contains("nope/nothing"));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let mut server = test_server();
        let outgoing = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;

        assert!(outgoing.is_none());
    }

    #[tokio::test]
    async fn malformed_json_gets_parse_error_with_null_id() {
        let mut server = test_server();
        let resp = respond(&mut server, "{ this is not json").await;

        assert_eq!(resp["error"]["code"], -32700);
        assert!(resp["id"].is_null());
    }

    #[tokio::test]
    async fn tool_call_round_trip() {
        let mut server = test_server();
        let _ = respond(&mut server, &initialize_line(1)).await;

        let resp = respond(
            &mut server,
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hello"}}}"#,
        )
        .await;

        assert_eq!(resp["id"], 7);
        assert_eq!(resp["result"]["isError"], false);
        assert_eq!(resp["result"]["content"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn unknown_tool_is_outcome_not_protocol_error() {
        let mut server = test_server();
        let _ = respond(&mut server, &initialize_line(1)).await;

        let resp = respond(
            &mut server,
            r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"ghost","arguments":{}}}"#,
        )
        .await;

        assert!(resp.get("error").is_none());
        assert_eq!(resp["result"]["isError"], true);
        assert!(resp["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("ghost"));
    }

    #[tokio::test]
    async fn guarded_tool_fails_auth_gate() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo {
            meta: ToolMetadata::new("guarded", ToolCategory::Basic, "needs auth"),
        }));
        let mut server = McpServer::new(
            &Config::default(),
            registry,
            Box::new(AnonymousAuth),
            Arc::new(ErrorTracker::new()),
            Arc::new(ServerStatus::new()),
        );
        let _ = respond(&mut server, &initialize_line(1)).await;

        let resp = respond(
            &mut server,
            r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"name":"guarded","arguments":{"message":"x"}}}"#,
        )
        .await;

        assert_eq!(resp["error"]["code"], -32001);
    }

    #[tokio::test]
    async fn resources_read_unknown_uri() {
        let mut server = test_server();
        let resp = respond(
            &mut server,
            r#"{"jsonrpc":"2.0","id":10,"method":"resources/read","params":{"uri":"stats://nope"}}"#,
        )
        .await;

        assert_eq!(resp["error"]["code"], -32003);
    }

    #[tokio::test]
    async fn resources_read_server_stats() {
        let mut server = test_server();
        let resp = respond(
            &mut server,
            r#"{"jsonrpc":"2.0","id":11,"method":"resources/read","params":{"uri":"stats://server"}}"#,
        )
        .await;

        let text = resp["result"]["contents"][0]["text"].as_str().unwrap();
        let stats: Value = serde_json::from_str(text).unwrap();
        assert!(stats["status"]["running"].is_boolean());
        assert!(stats["requests"]["total_requests"].is_number());
        assert!(stats["errors"]["total_errors"].is_number());
    }

    #[tokio::test]
    async fn prompts_get_unknown_name() {
        let mut server = test_server();
        let resp = respond(
            &mut server,
            r#"{"jsonrpc":"2.0","id":12,"method":"prompts/get","params":{"name":"nope"}}"#,
        )
        .await;

        assert_eq!(resp["error"]["code"], -32003);
    }

    #[tokio::test]
    async fn error_counters_track_protocol_failures() {
        let mut server = test_server();
        let _ = respond(&mut server, "garbage").await;
        let _ = respond(&mut server, r#"{"jsonrpc":"2.0","id":1,"method":"x"}"#).await;

        let snapshot = server.status().snapshot();
        assert_eq!(snapshot["requests"]["total_requests"], 2);
        assert_eq!(snapshot["requests"]["error_count"], 2);
    }
}
