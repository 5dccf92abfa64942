//! toolbridge-mcp: JSON-RPC 2.0 tool bridge speaking the Model Context Protocol
//!
//! This library accepts line-delimited JSON-RPC 2.0 messages over stdio,
//! routes them to named tools, and returns structured results or errors.
//!
//! # Architecture
//!
//! The dispatch path for a tool call composes several policies in order:
//!
//! enable check → rate limit → argument validation → auth gate →
//! timeout-bounded execution → statistics update → result formatting
//!
//! Failures split into two layers: protocol errors (malformed input, unknown
//! methods, authentication) surface as JSON-RPC `error` objects; tool
//! failures surface as successful responses with `result.isError == true`.
//!
//! # Modules
//!
//! - [`auth`] — Authentication gate for guarded tools
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error taxonomy, tracker, and retry helpers
//! - [`mcp`] — MCP protocol, transport, and dispatcher
//! - [`registry`] — Tool registry and guarded execution pipeline
//! - [`tools`] — Built-in tools

pub mod auth;
pub mod config;
pub mod error;
pub mod mcp;
pub mod registry;
pub mod tools;
