//! Folio Gate Server - Main entry point.
//!
//! This binary serves the admin login endpoints with:
//! - Structured JSON logging for production
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//! - Background login throttle cleanup
//!
//! # Configuration
//!
//! See [`folio_gate::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! FOLIO_ADMIN_PASSWORD_HASH="$(folio-gate hash-password)" \
//! FOLIO_TOTP_SECRET="JBSWY3DPEHPK3PXP" \
//! PORT=8080 \
//! cargo run --release --bin folio-gate-server
//! ```

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use folio_gate::config::Config;
use folio_gate::routes::{create_router, AppState};

/// Cleanup interval for idle login throttle entries.
const THROTTLE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables:");
            eprintln!("  FOLIO_ADMIN_PASSWORD_HASH      - SHA-256 of the admin password (64 hex chars)");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  FOLIO_TOTP_SECRET              - Base32 TOTP secret (enables 2FA)");
            eprintln!("  FOLIO_SESSION_MAX_AGE_SECS     - Session lifetime (default: 86400)");
            eprintln!("  FOLIO_SESSION_FUTURE_SKEW_SECS - Token clock skew (default: 60)");
            eprintln!("  FOLIO_TOTP_SKEW_STEPS          - TOTP steps either side (default: 1)");
            eprintln!("  FOLIO_COOKIE_SECURE            - Mark cookie Secure (default: false)");
            eprintln!("  FOLIO_TRUST_FORWARDED_FOR      - Throttle by X-Forwarded-For (default: false)");
            eprintln!("  PORT                           - HTTP server port (default: 8080)");
            eprintln!("  RUST_LOG                       - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    info!(
        port = config.port,
        totp_enabled = config.totp_enabled(),
        cookie_secure = config.cookie_secure,
        trust_forwarded_for = config.trust_forwarded_for,
        "Folio Gate server starting"
    );

    let state = AppState::new(config.clone());

    let cleanup_handle = state
        .throttle
        .spawn_cleanup_task(THROTTLE_CLEANUP_INTERVAL);
    info!(
        interval_secs = THROTTLE_CLEANUP_INTERVAL.as_secs(),
        "Login throttle cleanup task started"
    );

    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = match TcpListener::bind(&bind_addr).await {
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

    // Peer addresses feed the login throttle.
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    cleanup_handle.abort();
    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Initialize structured JSON logging.
///
/// `RUST_LOG` overrides the default filter of `info` plus request traces.
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

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
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
