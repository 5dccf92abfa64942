//! toolbridge-mcp: JSON-RPC 2.0 tool bridge speaking the Model Context Protocol
//!
//! Reads line-delimited JSON-RPC messages from stdin, dispatches them to
//! registered tools, and writes one response line per request to stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use toolbridge_mcp::auth::{AnonymousAuth, ApiKeyAuth, AuthProvider};
use toolbridge_mcp::config;
use toolbridge_mcp::error::ErrorTracker;
use toolbridge_mcp::mcp::server::{McpServer, ServerStatus};
use toolbridge_mcp::registry::ToolRegistry;
use toolbridge_mcp::tools::{EchoTool, ServerStatusTool};

/// JSON-RPC 2.0 tool bridge speaking the Model Context Protocol.
///
/// Routes tool calls through an enable check, rate limiter, argument
/// validation, auth gate, and timeout before execution.
#[derive(Parser, Debug)]
#[command(name = "toolbridge-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries only protocol messages.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the toolbridge-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting toolbridge-mcp server"
    );

    // Services are constructed once and threaded through explicitly.
    let status = Arc::new(ServerStatus::new());
    let tracker = Arc::new(ErrorTracker::new());

    let auth: Box<dyn AuthProvider> = match cfg.auth.api_key.clone() {
        Some(key) => Box::new(ApiKeyAuth::new(key)),
        None => Box::new(AnonymousAuth),
    };

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(EchoTool::new()));
    registry.register(Box::new(ServerStatusTool::new(
        Arc::clone(&status),
        Arc::clone(&tracker),
    )));

    let mut server = McpServer::new(&cfg, registry, auth, tracker, status);

    info!("MCP server ready, waiting for client connection...");

    // Run the server
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(server.run());

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
