//! # Distributed Tracing
//!
//! This module owns the OpenTelemetry tracer provider and hands out one span per
//! handled request.
//!
//! ## Key Features
//! - Jaeger agent export over UDP through a batch span processor on the tokio runtime
//! - `tracing` spans bridged to OpenTelemetry with `tracing-opentelemetry`
//! - Export never blocks a request; an unreachable agent only produces debug logs
//! - Falls back to a provider without exporter when tracing is disabled or the
//!   agent address cannot be resolved
//! - An agent that cannot be resolved at start-up is retried in the background;
//!   the exporter is swapped in through a reloadable layer once it resolves

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::{
    runtime,
    trace::{Config, Tracer, TracerProvider},
    Resource,
};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Span};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{reload, Registry};

use crate::core::error::{ServiceError, ServiceResult};
use crate::core::types::RequestContext;
use crate::observability::config::TracingConfig;

/// OpenTelemetry layer that can be replaced while the subscriber is live
pub type TraceLayer = reload::Layer<OpenTelemetryLayer<Registry, Tracer>, Registry>;

type TraceLayerHandle = reload::Handle<OpenTelemetryLayer<Registry, Tracer>, Registry>;

/// Where finished spans are going
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExporterStatus {
    /// Tracing switched off in configuration
    Disabled,
    /// Batches are sent to the Jaeger agent at this address
    Jaeger { endpoint: String },
    /// The exporter could not be built yet; spans are dropped
    Unavailable { endpoint: String, reason: String },
}

/// Distributed tracer shared by all handlers
pub struct DistributedTracer {
    provider: RwLock<TracerProvider>,
    service_name: String,
    endpoint: String,
    status: RwLock<ExporterStatus>,
    layer_handle: Mutex<Option<TraceLayerHandle>>,
}

impl std::fmt::Debug for DistributedTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedTracer")
            .field("service_name", &self.service_name)
            .field("status", &*self.status.read())
            .finish_non_exhaustive()
    }
}

/// Build a batch exporting provider for the Jaeger agent at `endpoint`
///
/// Resolves the address synchronously and spawns the batch task on the
/// current tokio runtime.
pub fn build_exporter(endpoint: &str, service_name: &str) -> ServiceResult<TracerProvider> {
    opentelemetry_jaeger::new_agent_pipeline()
        .with_endpoint(endpoint)
        .with_service_name(service_name)
        .with_auto_split_batch(true)
        .with_trace_config(DistributedTracer::trace_config(service_name))
        .build_batch(runtime::Tokio)
        .map_err(|e| ServiceError::telemetry(e.to_string()))
}

impl DistributedTracer {
    /// Build the tracer provider described by the configuration
    ///
    /// Must be called from within a tokio runtime when tracing is enabled, since
    /// the batch processor spawns its export task there.
    pub fn new(config: &TracingConfig) -> Self {
        let service_name = config.service_name.clone();
        let endpoint = config.agent_endpoint();

        if !config.enabled {
            return Self::without_exporter(service_name, endpoint, ExporterStatus::Disabled);
        }

        match build_exporter(&endpoint, &service_name) {
            Ok(provider) => {
                Self::install_error_handler();
                let status = ExporterStatus::Jaeger {
                    endpoint: endpoint.clone(),
                };
                Self::with_provider(provider, service_name, endpoint, status)
            }
            Err(e) => {
                let status = ExporterStatus::Unavailable {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                };
                Self::without_exporter(service_name, endpoint, status)
            }
        }
    }

    /// A tracer whose spans are recorded but never exported
    pub fn disabled<S: Into<String>>(service_name: S) -> Self {
        Self::without_exporter(service_name.into(), String::new(), ExporterStatus::Disabled)
    }

    fn without_exporter(service_name: String, endpoint: String, status: ExporterStatus) -> Self {
        let provider = TracerProvider::builder()
            .with_config(Self::trace_config(&service_name))
            .build();

        Self::with_provider(provider, service_name, endpoint, status)
    }

    fn with_provider(
        provider: TracerProvider,
        service_name: String,
        endpoint: String,
        status: ExporterStatus,
    ) -> Self {
        Self {
            provider: RwLock::new(provider),
            service_name,
            endpoint,
            status: RwLock::new(status),
            layer_handle: Mutex::new(None),
        }
    }

    fn trace_config(service_name: &str) -> Config {
        Config::default().with_resource(Resource::new(vec![
            KeyValue::new("service.name", service_name.to_string()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ]))
    }

    /// Route exporter failures (agent unreachable, oversized batch) to debug logs
    fn install_error_handler() {
        let installed = opentelemetry::global::set_error_handler(|error| {
            tracing::debug!(%error, "span export failed");
        });
        if let Err(e) = installed {
            warn!(error = %e, "Failed to install OpenTelemetry error handler");
        }
    }

    fn otel_layer(provider: &TracerProvider) -> OpenTelemetryLayer<Registry, Tracer> {
        tracing_opentelemetry::layer().with_tracer(provider.tracer("obs-demo"))
    }

    /// Layer bridging `tracing` spans into this provider
    ///
    /// The layer follows later exporter swaps. Only the most recently created
    /// layer is updated.
    pub fn layer(&self) -> TraceLayer {
        let (layer, handle) = reload::Layer::new(Self::otel_layer(&self.provider.read()));
        *self.layer_handle.lock() = Some(handle);
        layer
    }

    /// Keep resolving an unavailable agent until an exporter can be built
    ///
    /// Returns `None` when there is nothing to retry (tracing disabled or the
    /// exporter already running).
    pub fn spawn_reconnect(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        let service_name = self.service_name.clone();

        self.spawn_reconnect_with(interval, move |endpoint| {
            let service_name = service_name.clone();
            async move {
                tokio::net::lookup_host(endpoint.as_str())
                    .await
                    .map_err(|e| ServiceError::telemetry(e.to_string()))?;
                build_exporter(&endpoint, &service_name)
            }
        })
    }

    fn spawn_reconnect_with<F, Fut>(
        self: &Arc<Self>,
        interval: Duration,
        mut connect: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnMut(String) -> Fut + Send + 'static,
        Fut: Future<Output = ServiceResult<TracerProvider>> + Send,
    {
        if !matches!(*self.status.read(), ExporterStatus::Unavailable { .. }) {
            return None;
        }

        let tracer = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                match connect(tracer.endpoint.clone()).await {
                    Ok(provider) => {
                        tracer.install_provider(provider);
                        break;
                    }
                    Err(e) => debug!(
                        agent = %tracer.endpoint,
                        error = %e,
                        "Jaeger agent still unavailable"
                    ),
                }
            }
        }))
    }

    fn install_provider(&self, provider: TracerProvider) {
        if let Some(handle) = self.layer_handle.lock().as_ref() {
            if let Err(e) = handle.reload(Self::otel_layer(&provider)) {
                warn!(error = %e, "Failed to swap tracing layer");
            }
        }

        *self.provider.write() = provider;
        *self.status.write() = ExporterStatus::Jaeger {
            endpoint: self.endpoint.clone(),
        };
        Self::install_error_handler();

        info!(
            service = %self.service_name,
            agent = %self.endpoint,
            "Jaeger agent resolved, span export enabled"
        );
    }

    /// Open the span for one handler invocation
    ///
    /// The span closes when the returned handle (or the future instrumented with
    /// it) is dropped, on every exit path.
    pub fn start_span(&self, name: &'static str, ctx: &RequestContext) -> Span {
        tracing::info_span!(
            "handler",
            otel.name = name,
            otel.kind = "server",
            service.name = %self.service_name,
            http.method = %ctx.method,
            http.target = %ctx.path,
            request_id = %ctx.correlation_id,
        )
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn status(&self) -> ExporterStatus {
        self.status.read().clone()
    }

    /// Log where spans are going; called once the subscriber is installed
    pub fn log_status(&self) {
        match self.status() {
            ExporterStatus::Disabled => info!("Distributed tracing is disabled"),
            ExporterStatus::Jaeger { endpoint } => info!(
                service = %self.service_name,
                agent = %endpoint,
                "Distributed tracing initialized with Jaeger agent exporter"
            ),
            ExporterStatus::Unavailable { endpoint, reason } => warn!(
                service = %self.service_name,
                agent = %endpoint,
                %reason,
                "Jaeger exporter unavailable, spans are dropped until the agent resolves"
            ),
        }
    }

    /// Flush queued spans
    ///
    /// The flush blocks on the batch processor, so it runs on the blocking pool.
    pub async fn shutdown(&self) {
        let provider = self.provider.read().clone();
        let flushed = tokio::task::spawn_blocking(move || provider.force_flush()).await;

        match flushed {
            Ok(results) => {
                for result in results.into_iter().filter_map(Result::err) {
                    warn!(error = %result, "Failed to flush spans");
                }
                info!("Distributed tracer shutdown completed");
            }
            Err(e) => warn!(error = %e, "Span flush task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::CorrelationId;
    use axum::http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_subscriber::layer::SubscriberExt;

    fn context() -> RequestContext {
        RequestContext {
            method: Method::GET,
            path: "/".to_string(),
            query: Vec::new(),
            correlation_id: CorrelationId::default(),
        }
    }

    #[test]
    fn test_disabled_tracer() {
        let tracer = DistributedTracer::new(&TracingConfig {
            enabled: false,
            ..TracingConfig::default()
        });
        assert_eq!(tracer.status(), ExporterStatus::Disabled);
        assert_eq!(tracer.service_name(), "obs-demo-app");
    }

    #[tokio::test]
    async fn test_unresolvable_agent_falls_back() {
        let tracer = DistributedTracer::new(&TracingConfig {
            agent_host: "agent.invalid.".to_string(),
            ..TracingConfig::default()
        });

        match tracer.status() {
            ExporterStatus::Unavailable { endpoint, .. } => {
                assert_eq!(endpoint, "agent.invalid.:6831")
            }
            other => panic!("expected Unavailable, got {:?}", other),
        }

        // Spans still work without an exporter
        let span = tracer.start_span("hello-handler", &context());
        span.in_scope(|| {});
        tracer.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_agent_exporter() {
        let tracer = DistributedTracer::new(&TracingConfig {
            agent_host: "127.0.0.1".to_string(),
            ..TracingConfig::default()
        });
        assert_eq!(
            tracer.status(),
            ExporterStatus::Jaeger {
                endpoint: "127.0.0.1:6831".to_string()
            }
        );
        tracer.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_reconnect_when_exporter_is_not_needed() {
        let tracer = Arc::new(DistributedTracer::disabled("obs-demo-test"));
        assert!(tracer.spawn_reconnect(Duration::from_millis(10)).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exporter_installed_once_agent_resolves() {
        let tracer = Arc::new(DistributedTracer::new(&TracingConfig {
            agent_host: "not-yet-up.invalid.".to_string(),
            ..TracingConfig::default()
        }));
        assert!(matches!(tracer.status(), ExporterStatus::Unavailable { .. }));

        let subscriber = tracing_subscriber::registry().with(tracer.layer());
        let _guard = tracing::subscriber::set_default(subscriber);

        // First lookup fails, the second reaches a local agent
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let retry = tracer
            .spawn_reconnect_with(Duration::from_millis(10), move |_endpoint| {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(ServiceError::telemetry("agent not resolvable yet"))
                    } else {
                        build_exporter("127.0.0.1:6831", "obs-demo-test")
                    }
                }
            })
            .expect("reconnect task not started");

        tokio::time::timeout(Duration::from_secs(5), retry)
            .await
            .expect("reconnect did not finish")
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(
            tracer.status(),
            ExporterStatus::Jaeger {
                endpoint: "not-yet-up.invalid.:6831".to_string()
            }
        );

        let span = tracer.start_span("hello-handler", &context());
        span.in_scope(|| {});
        drop(span);
        tracer.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_keeps_retrying() {
        let tracer = Arc::new(DistributedTracer::new(&TracingConfig {
            agent_host: "still-down.invalid.".to_string(),
            ..TracingConfig::default()
        }));

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let retry = tracer
            .spawn_reconnect_with(Duration::from_millis(5), move |_endpoint| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::telemetry("agent not resolvable")) }
            })
            .expect("reconnect task not started");

        tokio::time::sleep(Duration::from_millis(100)).await;
        retry.abort();

        assert!(attempts.load(Ordering::SeqCst) >= 3);
        assert!(matches!(tracer.status(), ExporterStatus::Unavailable { .. }));
    }
}
