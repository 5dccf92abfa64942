//! Tool registry and guarded execution pipeline.
//!
//! The registry owns the tool descriptors by name, the per-tool rate-limiter
//! windows, and the per-tool execution statistics. [`ToolRegistry::call_tool`]
//! is the guarded invocation path every `tools/call` goes through:
//!
//! 1. existence check
//! 2. enablement check
//! 3. rate limit (60 second reset window; rejection does not consume a slot)
//! 4. argument validation against the tool's schema
//! 5. timeout-bounded execution (the pending operation is dropped on expiry)
//! 6. statistics update for executed calls
//! 7. result formatting into text content
//!
//! Every stage short-circuits to an `isError` outcome; none of them raise a
//! protocol-level error. Mutation happens only from the single dispatch path.

mod tool;

pub use tool::{
    ExecutionStats, Tool, ToolCallResult, ToolCategory, ToolContent, ToolContext, ToolDefinition,
    ToolError, ToolInputSchema, ToolMetadata,
};

use std::collections::HashMap;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Length of one rate-limit window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Per-tool rate limiter state.
#[derive(Debug)]
struct RateLimiterState {
    /// Start of the current window.
    window_start: Instant,
    /// Calls admitted in the current window. Never exceeds the tool's limit.
    count: u32,
}

/// Registry of named tools with per-tool rate limiting and statistics.
///
/// Tools are listed in registration order. Registering a name twice replaces
/// the earlier descriptor (last-write-wins) and resets its statistics.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Box<dyn Tool>>,
    limiters: HashMap<String, RateLimiterState>,
    stats: HashMap<String, ExecutionStats>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        info!("tool registry initialised");
        Self::default()
    }

    /// Registers a tool under its metadata name.
    ///
    /// An existing tool of the same name is replaced with a warning, and its
    /// statistics and rate-limiter window are discarded.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.metadata().name.clone();

        if self.tools.contains_key(&name) {
            warn!(tool_name = %name, "tool name conflict, replacing existing tool");
        }

        debug!(
            tool_name = %name,
            category = tool.metadata().category.as_str(),
            requires_auth = tool.metadata().requires_auth,
            "tool registered"
        );

        self.limiters.remove(&name);
        self.stats.insert(name.clone(), ExecutionStats::default());
        self.tools.insert(name, tool);
    }

    /// Removes a tool. Returns `false` if no such tool exists.
    pub fn unregister(&mut self, name: &str) -> bool {
        if self.tools.shift_remove(name).is_none() {
            return false;
        }
        self.limiters.remove(name);
        self.stats.remove(name);
        info!(tool_name = %name, "tool unregistered");
        true
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(AsRef::as_ref)
    }

    /// Returns public definitions, in registration order.
    ///
    /// Disabled tools are skipped unless `enabled_only` is `false`; a
    /// category filter keeps only matching tools.
    #[must_use]
    pub fn list(&self, category: Option<ToolCategory>, enabled_only: bool) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|tool| !enabled_only || tool.metadata().enabled)
            .filter(|tool| category.map_or(true, |c| tool.metadata().category == c))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Returns registered tool names, optionally filtered by category.
    #[must_use]
    pub fn tool_names(&self, category: Option<ToolCategory>) -> Vec<String> {
        self.tools
            .values()
            .filter(|tool| category.map_or(true, |c| tool.metadata().category == c))
            .map(|tool| tool.metadata().name.clone())
            .collect()
    }

    /// Returns a category to tool-names map covering every category.
    #[must_use]
    pub fn categories(&self) -> IndexMap<&'static str, Vec<String>> {
        ToolCategory::ALL
            .iter()
            .map(|&cat| (cat.as_str(), self.tool_names(Some(cat))))
            .collect()
    }

    /// Re-enables a tool. Returns `false` if no such tool exists.
    pub fn enable(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    /// Disables a tool. Returns `false` if no such tool exists.
    pub fn disable(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(tool) = self.tools.get_mut(name) else {
            return false;
        };
        tool.metadata_mut().enabled = enabled;
        info!(tool_name = %name, enabled, "tool enablement changed");
        true
    }

    /// Returns execution statistics for one tool.
    #[must_use]
    pub fn stats(&self, name: &str) -> Option<&ExecutionStats> {
        self.stats.get(name)
    }

    /// Returns per-tool statistics for every registered tool.
    #[must_use]
    pub fn all_stats(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (name, tool) in &self.tools {
            let meta = tool.metadata();
            let stats = self.stats.get(name).cloned().unwrap_or_default();
            map.insert(
                name.clone(),
                json!({
                    "metadata": {
                        "name": &meta.name,
                        "category": meta.category.as_str(),
                        "description": &meta.description,
                        "requires_auth": meta.requires_auth,
                        "rate_limit": meta.rate_limit,
                        "timeout_seconds": meta.timeout.as_secs_f64(),
                        "enabled": meta.enabled,
                    },
                    "stats": stats,
                }),
            );
        }
        Value::Object(map)
    }

    /// Returns summary counts for diagnostics.
    #[must_use]
    pub fn registry_info(&self) -> Value {
        let enabled = self
            .tools
            .values()
            .filter(|t| t.metadata().enabled)
            .count();
        let rate_limited = self
            .tools
            .values()
            .filter(|t| t.metadata().rate_limit.is_some())
            .count();
        let by_category: serde_json::Map<String, Value> = ToolCategory::ALL
            .iter()
            .map(|&cat| {
                (
                    cat.as_str().to_string(),
                    json!(self.tool_names(Some(cat)).len()),
                )
            })
            .collect();

        json!({
            "total_tools": self.tools.len(),
            "categories": by_category,
            "enabled_tools": enabled,
            "disabled_tools": self.tools.len() - enabled,
            "rate_limited_tools": rate_limited,
        })
    }

    /// Invokes a tool through the guarded pipeline.
    ///
    /// Every failure mode short-circuits to an `isError` outcome whose
    /// message identifies the failing stage; the call never raises a
    /// protocol-level error.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: &Value,
        ctx: &ToolContext,
    ) -> ToolCallResult {
        // Stage 1: existence
        let Some(tool) = self.tools.get(name) else {
            return ToolCallResult::error(format!("tool '{name}' not found"));
        };

        let meta = tool.metadata();

        // Stage 2: enablement
        if !meta.enabled {
            return ToolCallResult::error(format!("tool '{name}' is disabled"));
        }

        let rate_limit = meta.rate_limit;
        let timeout = meta.timeout;
        let schema = tool.input_schema();

        // Stage 3: rate limit
        if let Some(limit) = rate_limit {
            if !self.admit_call(name, limit) {
                return ToolCallResult::error(format!("tool '{name}' is rate limited"));
            }
        }

        // Stage 4: argument validation
        if let Err(message) = schema.validate(arguments) {
            return ToolCallResult::error(format!("argument validation failed: {message}"));
        }

        // Stage 5: timeout-bounded execution. Dropping the timed-out future
        // cancels the pending operation.
        let Some(tool) = self.tools.get(name) else {
            return ToolCallResult::error(format!("tool '{name}' not found"));
        };

        let start = Instant::now();
        let outcome = tokio::time::timeout(timeout, tool.execute(arguments, ctx)).await;
        let elapsed = start.elapsed();

        // Stage 6: statistics (executed calls only), then stage 7: formatting
        match outcome {
            Err(_) => {
                self.update_stats(name, elapsed, false);
                warn!(tool_name = %name, timeout_seconds = timeout.as_secs_f64(), "tool timed out");
                ToolCallResult::error(format!(
                    "tool '{name}' timed out after {:.1}s",
                    timeout.as_secs_f64()
                ))
            }
            Ok(Err(err)) => {
                self.update_stats(name, elapsed, false);
                warn!(tool_name = %name, error = %err, "tool execution failed");
                ToolCallResult::error(format!("tool execution failed: {err}"))
            }
            Ok(Ok(value)) => {
                self.update_stats(name, elapsed, true);
                debug!(
                    tool_name = %name,
                    execution_seconds = elapsed.as_secs_f64(),
                    "tool executed"
                );
                ToolCallResult::text(format_value(&value))
            }
        }
    }

    /// Admits or rejects one call against the tool's rate window.
    ///
    /// A rejected call does not consume a slot.
    fn admit_call(&mut self, name: &str, limit: u32) -> bool {
        let now = Instant::now();
        let limiter = self
            .limiters
            .entry(name.to_string())
            .or_insert_with(|| RateLimiterState {
                window_start: now,
                count: 0,
            });

        if now.duration_since(limiter.window_start) >= RATE_WINDOW {
            limiter.window_start = now;
            limiter.count = 0;
        }

        if limiter.count >= limit {
            return false;
        }

        limiter.count += 1;
        true
    }

    fn update_stats(&mut self, name: &str, elapsed: Duration, success: bool) {
        self.stats
            .entry(name.to_string())
            .or_default()
            .update(elapsed, success);
    }
}

/// Renders a tool's return value as text content.
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
