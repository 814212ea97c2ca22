//! Azure SQL MCP Server entry point.
//!
//! This binary starts the MCP server using stdio transport for integration
//! with Claude Desktop, Cursor, and other MCP clients.
//!
//! Features:
//! - Configuration from environment variables (and an optional `.env` file)
//! - Graceful shutdown with invocation draining
//! - Signal handling (SIGTERM, SIGINT, SIGHUP)

use anyhow::{Context, Result};
use azure_sql_mcp::shutdown::{install_signal_handlers, new_shutdown_controller, ShutdownConfig};
use azure_sql_mcp::{AzureSqlMcpServer, Config, Gateway};
use rmcp::ServiceExt;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; real deployments use the environment
    let dotenv = dotenvy::dotenv();

    // Initialize logging to stderr (stdout is reserved for JSON-RPC)
    init_logging();

    let version = env!("CARGO_PKG_VERSION");
    eprintln!("Azure SQL MCP Server v{version} starting...");
    eprintln!("Transport: stdio");
    if let Ok(path) = dotenv {
        eprintln!("Loaded environment from {}", path.display());
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] {}", info);
    }));

    let config = Config::from_env().context("Invalid configuration")?;
    eprintln!(
        "Configuration loaded: {}:{}/{} ({} auth)",
        config.database.host,
        config.database.port,
        config.database.database,
        config.database.auth.method_name()
    );

    let shutdown_config = ShutdownConfig::from_env().context("Invalid shutdown configuration")?;
    let shutdown_controller = new_shutdown_controller(&shutdown_config);
    install_signal_handlers(shutdown_controller.clone()).await;

    // The gateway connects lazily; an unreachable database surfaces as a
    // connectivity error on the first tool call.
    let gateway = Arc::new(Gateway::with_mssql(Arc::new(config)));
    let server = AzureSqlMcpServer::new(gateway.clone());
    eprintln!("Server initialized. Ready to accept requests...");

    let transport = rmcp::transport::stdio();
    let service = server.serve(transport).await?;

    let mut shutdown_signal = shutdown_controller.signal();

    tokio::select! {
        quit_reason = service.waiting() => {
            match quit_reason {
                Ok(reason) => eprintln!("Service stopped: {reason:?}"),
                Err(e) => eprintln!("Service error: {e}"),
            }
        }
        _ = shutdown_signal.recv() => {
            eprintln!("Shutdown signal received");
        }
    }

    eprintln!("Initiating graceful shutdown...");
    shutdown_controller.graceful_shutdown(&gateway).await;
    eprintln!("Server shutdown complete");

    Ok(())
}

/// Initialize tracing subscriber with stderr output.
///
/// Logs MUST go to stderr because stdout is used for JSON-RPC communication.
fn init_logging() {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("warn,azure_sql_mcp=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
