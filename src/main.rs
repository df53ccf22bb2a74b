//! To-do API server.
//!
//! # Environment Variables
//!
//! - `HOST` / `PORT`: bind address (default `0.0.0.0:3000`)
//! - `WORKER_THREADS`: tokio worker threads (default: logical CPU count)
//! - `LOG_FORMAT`: `json` for structured logs, anything else for text
//! - `RUST_LOG`: tracing filter (default `todo_api=debug,tower_http=debug`)
//!
//! Storage, auth and limits are read by
//! [`ServiceConfig`](todo_api::infrastructure::ServiceConfig).

use std::env;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use todo_api::api::{AppConfig, AppState, build_router};
use todo_api::infrastructure::ServiceFactory;

const DEFAULT_LOG_FILTER: &str = "todo_api=debug,tower_http=debug";

/// Result of parsing `WORKER_THREADS`.
struct WorkerThreadsResult {
    threads: Option<usize>,
    warning_emitted: bool,
}

/// Reads `WORKER_THREADS`. Runs before tracing is initialized, so warnings
/// go to stderr.
fn parse_worker_threads() -> WorkerThreadsResult {
    let unset = WorkerThreadsResult {
        threads: None,
        warning_emitted: false,
    };
    let Ok(value) = env::var("WORKER_THREADS") else {
        return unset;
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return unset;
    }

    match trimmed.parse::<usize>() {
        Ok(0) => {
            eprintln!("Warning: WORKER_THREADS=0 is invalid (must be > 0), using default");
            WorkerThreadsResult {
                threads: None,
                warning_emitted: true,
            }
        }
        Ok(threads) => WorkerThreadsResult {
            threads: Some(threads),
            warning_emitted: false,
        },
        Err(error) => {
            eprintln!(
                "Warning: WORKER_THREADS='{trimmed}' is not a valid number ({error}), using default"
            );
            WorkerThreadsResult {
                threads: None,
                warning_emitted: true,
            }
        }
    }
}

fn main() {
    dotenvy::dotenv().ok();

    let result = parse_worker_threads();
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = result.threads {
        builder.worker_threads(threads);
    } else if !result.warning_emitted {
        eprintln!("Tokio worker_threads: using default (logical CPU count)");
    }

    let runtime = builder.build().expect("Failed to create tokio runtime");
    runtime.block_on(async_main());
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn async_main() {
    init_tracing();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting to-do API");

    let factory = match ServiceFactory::from_env() {
        Ok(factory) => factory,
        Err(error) => {
            tracing::error!(%error, "Configuration error");
            std::process::exit(1);
        }
    };
    let config = factory.config().clone();
    tracing::info!(
        storage_mode = ?config.storage_mode,
        auth_mode = ?config.auth_mode,
        object_storage_mode = ?config.object_storage_mode,
        "Service configuration loaded"
    );

    let services = match factory.create().await {
        Ok(services) => services,
        Err(error) => {
            tracing::error!(%error, "Failed to initialize services");
            std::process::exit(1);
        }
    };

    let application = build_router(AppState::new(services, AppConfig::from(&config)));

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(3000);

    let address: SocketAddr = match format!("{host}:{port}").parse() {
        Ok(address) => address,
        Err(error) => {
            tracing::error!(%error, "Invalid server address: {}:{}", host, port);
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, "Failed to bind to address {}", address);
            std::process::exit(1);
        }
    };

    match listener.local_addr() {
        Ok(address) => tracing::info!("Listening on {}", address),
        Err(error) => tracing::warn!(%error, "Could not determine local address"),
    }

    if let Err(error) = axum::serve(listener, application)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%error, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Server shut down");
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
