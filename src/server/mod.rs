//! # HTTP Server Module
//!
//! This module builds the routing table, the shared application state and runs
//! the axum server with graceful shutdown.
//!
//! ## Routes
//! - `GET /` fixed simulated work
//! - `GET /work?t=<seconds>` variable simulated work
//! - `GET /metrics` Prometheus exposition (path configurable, not self-instrumented)
//! - `GET /health` liveness probe
//!
//! Everything else answers with a JSON 404.

pub mod handlers;

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::core::config::AppConfig;
use crate::core::error::ServiceResult;
use crate::core::types::RequestContext;
use crate::observability::{DistributedTracer, MetricsCollector, StructuredLogger};

/// State shared by every handler
///
/// All collaborators are built once at start-up and handed to handlers through
/// this handle; nothing is reached through globals.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub metrics: Arc<MetricsCollector>,
    pub tracer: Arc<DistributedTracer>,
    pub logger: Arc<StructuredLogger>,
}

impl AppState {
    pub fn new(config: AppConfig, tracer: Arc<DistributedTracer>) -> ServiceResult<Self> {
        let metrics = MetricsCollector::new(&config.observability.metrics)?;
        let logger = StructuredLogger::new(config.observability.logging.logger_name.clone());

        Ok(Self {
            config: Arc::new(config),
            metrics: Arc::new(metrics),
            tracer,
            logger: Arc::new(logger),
        })
    }

    /// Record latency and the request counter for one instrumented request
    pub fn record(&self, ctx: &RequestContext, route: &str, status: StatusCode, elapsed: Duration) {
        self.metrics.observe_latency(route, elapsed);
        self.metrics
            .record_request(ctx.method.as_str(), route, status.as_u16());
    }
}

/// Build the routing table
pub fn build_router(state: AppState) -> Router {
    let metrics = &state.config.observability.metrics;

    let mut router = Router::new()
        .route(handlers::ROOT_ROUTE, get(handlers::hello))
        .route(handlers::WORK_ROUTE, get(handlers::work))
        .route(handlers::HEALTH_ROUTE, get(handlers::health));

    if metrics.enabled {
        router = router.route(&metrics.endpoint, get(handlers::metrics));
    }

    router.fallback(handlers::not_found).with_state(state)
}

/// Serve until SIGINT or SIGTERM
pub async fn run(listener: TcpListener, state: AppState) -> ServiceResult<()> {
    run_until(listener, state, shutdown_signal()).await
}

/// Serve until `shutdown` resolves, then drain in-flight requests
///
/// Draining is bounded by `server.shutdown_timeout`; connections still open
/// after that are dropped.
pub async fn run_until<F>(listener: TcpListener, state: AppState, shutdown: F) -> ServiceResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let drain_timeout = state.config.server.shutdown_timeout;
    let (started_tx, started_rx) = oneshot::channel::<()>();

    let graceful = async move {
        shutdown.await;
        let _ = started_tx.send(());
    };

    let server = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(graceful)
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        Ok(()) = started_rx => {
            info!(timeout = ?drain_timeout, "Waiting for in-flight requests to complete");
            match tokio::time::timeout(drain_timeout, &mut server).await {
                Ok(result) => result?,
                Err(_) => warn!(timeout = ?drain_timeout, "Shutdown timed out, dropping open connections"),
            }
        }
    }

    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
