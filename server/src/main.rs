//! OmeroFS monitor server - Main entry point.
//!
//! This binary starts the monitor server with:
//! - Structured JSON logging for production
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//! - Every monitor destroyed on shutdown, releasing its watch
//!
//! # Configuration
//!
//! See [`omerofs_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # Defaults: 127.0.0.1:8080, native file system notifications
//! cargo run --bin omerofs-server
//!
//! # Polling backend for network file systems
//! OMEROFS_BACKEND=poll OMEROFS_POLL_INTERVAL_MS=2000 \
//! PORT=9090 \
//! cargo run --release --bin omerofs-server
//! ```

use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use omerofs_server::config::Config;
use omerofs_server::routes::{create_router, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    init_logging();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT                          - HTTP server port (default: 8080)");
            eprintln!("  OMEROFS_BIND_ADDR             - Listen address (default: 127.0.0.1)");
            eprintln!("  OMEROFS_MAX_MONITORS          - Monitor limit (default: 1024)");
            eprintln!("  OMEROFS_CALLBACK_TIMEOUT_SECS - Callback timeout (default: 10)");
            eprintln!("  OMEROFS_BACKEND               - native or poll (default: native)");
            eprintln!("  OMEROFS_POLL_INTERVAL_MS      - Poll interval (default: 1000)");
            eprintln!("  OMEROFS_BLOCK_SIZE            - Default block size (default: 100)");
            eprintln!("  OMEROFS_TIMEOUT_MS            - Default timeout (default: 10000)");
            eprintln!("  OMEROFS_DELIVERY_CAPACITY     - Queued notifications per monitor (default: 1024)");
            eprintln!("  RUST_LOG                      - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    info!(
        address = %config.socket_addr(),
        backend = %config.monitor.backend,
        max_monitors = config.max_monitors,
        "OmeroFS monitor server starting"
    );

    // Create application state
    let state = match AppState::new(config.clone()) {
        Ok(state) => state,
        Err(err) => {
            error!(error = %err, "Failed to initialize server");
            return ExitCode::from(1);
        }
    };
    let monitors = state.server.clone();

    // Create router
    let app = create_router(state);

    // Bind to address
    let bind_addr = config.socket_addr();
    let listener = match TcpListener::bind(bind_addr).await {
        Ok(listener) => {
            info!(address = %bind_addr, "Server listening");
            listener
        }
        Err(err) => {
            error!(
                error = %err,
                address = %bind_addr,
                "Failed to bind to address"
            );
            return ExitCode::from(1);
        }
    };

    // Start server with graceful shutdown
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    info!("Server ready to accept connections");

    let result = server.await;

    // Release every watch whether or not serving failed
    info!("Server shutting down gracefully");
    let destroyed = monitors.shutdown();
    info!(destroyed, "Monitors released");

    if let Err(err) = result {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Initialize structured logging with tracing.
///
/// Configures JSON-formatted output with:
/// - Environment-based log level filtering via RUST_LOG
/// - Default log level of `info`
/// - Target and level information
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Creates a future that resolves when a shutdown signal is received.
///
/// Listens for:
/// - SIGTERM (service manager shutdown)
/// - SIGINT (Ctrl+C)
///
/// A handler that cannot be installed is logged and never resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
