//! Error types and the error taxonomy for toolbridge-mcp.
//!
//! Two error families exist, and they stay structurally distinct:
//!
//! - [`ServerError`] — protocol-level failures that surface as a JSON-RPC
//!   `error` object. Every variant maps to exactly one code from the closed
//!   enumeration in [`crate::mcp::protocol::ErrorCode`].
//! - Tool-outcome failures — business-level failures that surface as a
//!   *successful* response with `isError: true`; those never pass through
//!   this module (see [`crate::registry`]).
//!
//! The [`ErrorTracker`] records every handled protocol error into a bounded
//! rolling log and a per-kind histogram, exposed read-only through the
//! `stats://server` resource.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp::protocol::{ErrorCode, JsonRpcErrorData};

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Protocol-level failures, each carrying its JSON-RPC error code.
#[derive(Error, Debug, Clone)]
pub enum ServerError {
    /// The caller could not be authenticated.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The caller lacks permission for the operation.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// A referenced resource does not exist.
    #[error("{resource_type} '{resource_id}' not found")]
    ResourceNotFound {
        /// Kind of resource (e.g. "resource", "prompt").
        resource_type: String,
        /// Identifier that failed to resolve.
        resource_id: String,
    },

    /// A required collaborator is temporarily unavailable.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A rate limit was exceeded.
    #[error("rate limit exceeded: {limit} calls/{window}")]
    RateLimitExceeded {
        /// Maximum calls allowed in the window.
        limit: u32,
        /// Human-readable window description.
        window: String,
    },

    /// A tool failed during execution.
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution {
        /// Name of the failing tool.
        tool: String,
        /// Failure description.
        message: String,
    },

    /// A request parameter failed validation.
    #[error("invalid parameter '{field}': {message}")]
    InvalidParams {
        /// Name of the offending field.
        field: String,
        /// Validation failure description.
        message: String,
    },

    /// Anything that fits no other variant.
    #[error("{0}")]
    Internal(String),
}

impl ServerError {
    /// Returns the JSON-RPC error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Authentication(_) => ErrorCode::AuthenticationError,
            Self::Authorization(_) => ErrorCode::AuthorizationError,
            Self::ResourceNotFound { .. } => ErrorCode::ResourceNotFound,
            Self::ResourceUnavailable(_) => ErrorCode::ResourceUnavailable,
            Self::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            Self::ToolExecution { .. } => ErrorCode::ToolExecutionError,
            Self::InvalidParams { .. } => ErrorCode::InvalidParams,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Returns a stable name for this failure kind, used as the histogram key.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "Authentication",
            Self::Authorization(_) => "Authorization",
            Self::ResourceNotFound { .. } => "ResourceNotFound",
            Self::ResourceUnavailable(_) => "ResourceUnavailable",
            Self::RateLimitExceeded { .. } => "RateLimitExceeded",
            Self::ToolExecution { .. } => "ToolExecution",
            Self::InvalidParams { .. } => "InvalidParams",
            Self::Internal(_) => "Internal",
        }
    }

    /// Converts this failure into a JSON-RPC error object.
    #[must_use]
    pub fn to_error_data(&self) -> JsonRpcErrorData {
        JsonRpcErrorData::with_message(self.code(), self.to_string())
    }
}

/// Classifies a generic I/O failure onto the closed taxonomy.
///
/// Not-found maps to the resource family, permission problems to the
/// authorization family, connection and timeout problems to unavailability,
/// malformed input to invalid params. Everything else is internal.
impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => Self::ResourceNotFound {
                resource_type: "resource".to_string(),
                resource_id: err.to_string(),
            },
            ErrorKind::PermissionDenied => Self::Authorization(err.to_string()),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut => Self::ResourceUnavailable(err.to_string()),
            ErrorKind::InvalidInput | ErrorKind::InvalidData => Self::InvalidParams {
                field: "input".to_string(),
                message: err.to_string(),
            },
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidParams {
            field: "params".to_string(),
            message: err.to_string(),
        }
    }
}

/// One entry in the rolling error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Failure kind (histogram key).
    pub kind: String,
    /// Rendered error message.
    pub message: String,
    /// When the error was handled.
    pub timestamp: DateTime<Utc>,
}

/// Most recent entries kept in the rolling log.
const RECENT_CAPACITY: usize = 50;

#[derive(Debug, Default)]
struct TrackerState {
    total_errors: u64,
    by_kind: HashMap<String, u64>,
    recent: VecDeque<ErrorRecord>,
}

/// Bookkeeping for handled errors: a total counter, a kind histogram, and a
/// rolling log of the most recent entries.
///
/// Recording has no effect on dispatch behaviour; the data is only surfaced
/// through diagnostics.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    state: Mutex<TrackerState>,
}

impl ErrorTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a handled server error.
    pub fn record(&self, err: &ServerError) {
        self.record_raw(err.kind(), &err.to_string());
    }

    /// Records an arbitrary failure under an explicit kind.
    pub fn record_raw(&self, kind: &str, message: &str) {
        let mut state = self.lock();

        state.total_errors += 1;
        *state.by_kind.entry(kind.to_string()).or_insert(0) += 1;

        state.recent.push_back(ErrorRecord {
            kind: kind.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        while state.recent.len() > RECENT_CAPACITY {
            state.recent.pop_front();
        }
    }

    /// Returns the total number of recorded errors.
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.lock().total_errors
    }

    /// Returns a read-only snapshot of the error statistics.
    #[must_use]
    pub fn stats(&self) -> Value {
        let state = self.lock();
        json!({
            "total_errors": state.total_errors,
            "error_types": &state.by_kind,
            "recent_errors": &state.recent,
        })
    }

    /// Records a failure and passes the result through unchanged.
    ///
    /// # Errors
    ///
    /// Returns the original error after recording it.
    pub fn track<T>(&self, result: Result<T, ServerError>) -> Result<T, ServerError> {
        if let Err(ref err) = result {
            self.record(err);
        }
        result
    }

    /// Discards all recorded statistics.
    pub fn clear(&self) {
        let mut state = self.lock();
        *state = TrackerState::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Runs a fallible operation, recording any failure and substituting a
/// caller-supplied default.
pub fn guard<T>(tracker: &ErrorTracker, result: Result<T, ServerError>, default: T) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracker.record(&err);
            default
        }
    }
}

/// Re-invokes an async operation up to `max_retries` additional times,
/// sleeping `backoff_factor * 2^attempt` between attempts.
///
/// The sleep is cooperative; the final error is returned if every attempt
/// fails.
///
/// # Errors
///
/// Returns the last error produced by the operation.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_retries: u32,
    backoff_factor: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_retries {
                    return Err(err);
                }
                let delay = backoff_factor * 2_u32.saturating_pow(attempt);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));
    }

    #[test]
    fn validation_error_display() {
        let error = ConfigError::ValidationError {
            message: "invalid setting".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("invalid setting"));
    }

    #[test]
    fn server_error_codes() {
        assert_eq!(
            ServerError::Authentication("no key".into()).code().code(),
            -32001
        );
        assert_eq!(
            ServerError::RateLimitExceeded {
                limit: 5,
                window: "minute".into()
            }
            .code()
            .code(),
            -32005
        );
        assert_eq!(ServerError::Internal("boom".into()).code().code(), -32603);
    }

    #[test]
    fn io_error_classification() {
        use std::io::{Error, ErrorKind};

        let not_found: ServerError = Error::new(ErrorKind::NotFound, "missing").into();
        assert_eq!(not_found.code(), ErrorCode::ResourceNotFound);

        let denied: ServerError = Error::new(ErrorKind::PermissionDenied, "nope").into();
        assert_eq!(denied.code(), ErrorCode::AuthorizationError);

        let timeout: ServerError = Error::new(ErrorKind::TimedOut, "slow").into();
        assert_eq!(timeout.code(), ErrorCode::ResourceUnavailable);

        let bad_input: ServerError = Error::new(ErrorKind::InvalidInput, "bad").into();
        assert_eq!(bad_input.code(), ErrorCode::InvalidParams);

        let other: ServerError = Error::new(ErrorKind::Other, "???").into();
        assert_eq!(other.code(), ErrorCode::InternalError);
    }

    #[test]
    fn tracker_counts_by_kind() {
        let tracker = ErrorTracker::new();
        tracker.record(&ServerError::Internal("a".into()));
        tracker.record(&ServerError::Internal("b".into()));
        tracker.record(&ServerError::Authentication("c".into()));

        assert_eq!(tracker.total_errors(), 3);

        let stats = tracker.stats();
        assert_eq!(stats["error_types"]["Internal"], 2);
        assert_eq!(stats["error_types"]["Authentication"], 1);
    }

    #[test]
    fn tracker_bounds_recent_log() {
        let tracker = ErrorTracker::new();
        for i in 0..60 {
            tracker.record(&ServerError::Internal(format!("error {i}")));
        }

        let stats = tracker.stats();
        let recent = stats["recent_errors"].as_array().unwrap();
        assert_eq!(recent.len(), 50);
        // Oldest entries were evicted
        assert_eq!(recent[0]["message"], "error 10");
        assert_eq!(recent[49]["message"], "error 59");
    }

    #[test]
    fn tracker_clear_resets() {
        let tracker = ErrorTracker::new();
        tracker.record(&ServerError::Internal("x".into()));
        tracker.clear();
        assert_eq!(tracker.total_errors(), 0);
    }

    #[test]
    fn track_records_and_rethrows() {
        let tracker = ErrorTracker::new();
        let result: Result<(), ServerError> =
            tracker.track(Err(ServerError::Authorization("denied".into())));

        assert!(result.is_err());
        assert_eq!(tracker.total_errors(), 1);

        let passed = tracker.track(Ok(5));
        assert_eq!(passed.unwrap(), 5);
        assert_eq!(tracker.total_errors(), 1);
    }

    #[test]
    fn guard_returns_default_and_records() {
        let tracker = ErrorTracker::new();
        let value = guard(&tracker, Err(ServerError::Internal("bad".into())), 7);
        assert_eq!(value, 7);
        assert_eq!(tracker.total_errors(), 1);

        let value = guard(&tracker, Ok(3), 7);
        assert_eq!(value, 3);
        assert_eq!(tracker.total_errors(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_after_failures() {
        let mut attempts = 0;
        let result: Result<u32, &str> =
            retry_with_backoff(3, Duration::from_millis(10), || {
                attempts += 1;
                let outcome = if attempts < 3 { Err("flaky") } else { Ok(42) };
                async move { outcome }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_exhausts_and_returns_last_error() {
        let mut attempts = 0;
        let result: Result<u32, String> =
            retry_with_backoff(2, Duration::from_millis(10), || {
                attempts += 1;
                let err = format!("attempt {attempts}");
                async move { Err(err) }
            })
            .await;

        assert_eq!(result, Err("attempt 3".to_string()));
    }
}
