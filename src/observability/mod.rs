// Observability configuration
pub mod config;

// Request metrics and Prometheus exposition
pub mod metrics;

// Structured logging
pub mod logging;

// Distributed tracing
pub mod tracing;

// Re-export commonly used types for convenience
pub use self::config::{LogConfig, LogFormat, MetricsConfig, ObservabilityConfig, TracingConfig};
pub use self::logging::{CorrelationId, StructuredLogger};
pub use self::metrics::MetricsCollector;
pub use self::tracing::{DistributedTracer, ExporterStatus};
