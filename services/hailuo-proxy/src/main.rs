//! Hailuo token gateway
//!
//! Single-binary Rust service that:
//! 1. Loads the token pool from disk (or the bootstrap list)
//! 2. Renews every token at startup and then on a fixed interval
//! 3. Serves the management API, health and Prometheus metrics

mod admin;
mod config;
mod error;
mod metrics;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hailuo_auth::{FileTokenStore, RenewalClient};
use hailuo_pool::{RefreshScheduler, TokenBroker, TokenPool};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::admin::{AdminState, build_admin_router};
use crate::config::Config;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state for the health and metrics handlers
#[derive(Clone)]
struct AppState {
    broker: Arc<TokenBroker>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, admin: AdminState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(build_admin_router(admin))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting hailuo-free-api");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        store_path = %config.tokens.store_path.display(),
        bootstrap = config.tokens.bootstrap.len(),
        refresh_interval_secs = config.tokens.refresh_interval_secs,
        "configuration loaded"
    );
    if config.server.api_key.is_none() {
        warn!("no API key configured (HAILUO_API_KEY or api_key_file), management API will reject all requests");
    }

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let mut renewer = RenewalClient::new(http);
    if let Some(endpoint) = &config.tokens.renewal_endpoint {
        renewer = renewer.with_endpoint(endpoint.clone());
    }
    info!(endpoint = renewer.endpoint(), "renewal client ready");

    let store = Arc::new(FileTokenStore::new(config.tokens.store_path.clone()));
    let (pool, origin) =
        TokenPool::open(store, Arc::new(renewer), config.tokens.bootstrap.clone()).await;
    let token_count = pool.count().await;
    info!(origin = origin.label(), tokens = token_count, "token pool ready");
    if token_count == 0 {
        warn!("token pool is empty, add tokens with POST /v1/token");
    }

    let broker = Arc::new(TokenBroker::new(Arc::new(pool)));
    let scheduler = RefreshScheduler::new(broker.clone(), config.tokens.refresh_interval());
    scheduler.start();

    let app_state = AppState {
        broker: broker.clone(),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };
    let admin_state = AdminState::new(broker, scheduler.clone(), config.server.api_key.clone());
    let app = build_router(app_state, admin_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race it against the
    // timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    // Stop timers first so no refresh starts while the server drains. A
    // refresh that is already running finishes and persists.
    scheduler.stop().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: 200 while the pool has tokens to hand out, 503 when it
/// is empty.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let token_count = state.broker.token_count().await;
    let sessions = state.broker.session_count().await;
    let last_refresh = state.broker.status().await;

    let (status_code, status) = if token_count > 0 {
        (axum::http::StatusCode::OK, "healthy")
    } else {
        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = serde_json::json!({
        "status": status,
        "tokenCount": token_count,
        "sessions": sessions,
        "lastRefresh": last_refresh,
        "uptime_seconds": uptime,
    });

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
