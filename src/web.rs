//! HTTP surface (spec.md §6): `/metrics`, `/health`, `/`, served behind
//! a bounded-concurrency, timeout-guarded axum router, with a graceful
//! shutdown that drains in-flight requests for up to 30 seconds.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{BoxError, Router};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::sync::RwLock;
use tower::limit::ConcurrencyLimitLayer;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// `promhttp.HandlerOpts.MaxRequestsInFlight` (spec.md §6).
const MAX_REQUESTS_IN_FLIGHT: usize = 10;

use crate::collector::ExporterCollector;
use crate::config::Config;
use crate::tenant::Tenant;

const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
}

/// Builds the router and serves it until a shutdown signal arrives,
/// draining in-flight requests for up to 30 seconds (SPEC_FULL.md §3,
/// grounded on the original's `server.Shutdown(shutdownCtx)`).
pub async fn serve(config: Arc<Config>, tenants: Arc<RwLock<Vec<Tenant>>>) -> anyhow::Result<()> {
    let registry = Registry::new();
    let collector = ExporterCollector::new(Arc::clone(&config), tenants);
    registry
        .register(Box::new(collector))
        .map_err(|e| anyhow::anyhow!("registering collector: {e}"))?;
    crate::collector::maybe_register_process_collector(&registry, &config.log_level);

    let state = AppState {
        registry: Arc::new(registry),
    };

    let metrics_route = get(metrics_handler).layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_metrics_layer_error))
            .layer(ConcurrencyLimitLayer::new(MAX_REQUESTS_IN_FLIGHT))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeout))),
    );

    let app = Router::new()
        .route("/metrics", metrics_route)
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.ip, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address {}:{}: {e}", config.ip, config.port))?;
    info!(%addr, "starting HTTP listener");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!(drain_seconds = SHUTDOWN_DRAIN.as_secs(), "shutdown signal received, draining");
}

async fn handle_metrics_layer_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled error: {err}"))
    }
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let families = state.registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        tracing::error!(%err, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "encode error".to_string()).into_response();
    }
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}

async fn root_handler() -> impl IntoResponse {
    (StatusCode::OK, "SAP HANA SQL exporter. See /metrics.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_handler_returns_ok_with_expected_body() {
        let response = health_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn root_handler_mentions_metrics_path() {
        let response = root_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
