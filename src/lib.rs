//! # obs-demo - Observability Demo Service
//!
//! A small HTTP service whose only purpose is to produce telemetry: two endpoints
//! simulate work, every handled request emits a JSON log line, updates Prometheus
//! metrics and produces a span exported to a Jaeger agent.
//!
//! ## Module Layout
//! - `core`: error type, configuration and per-request context
//! - `observability`: metrics collector, structured logger and distributed tracer
//! - `server`: routing table, handlers and the server loop
//!
//! ## Request Flow
//! ```text
//! request ─▶ router ─▶ handler ─┬─▶ span (tracer, exported in batches)
//!                               ├─▶ simulated work (non-blocking sleep)
//!                               ├─▶ latency + request counter (metrics)
//!                               └─▶ one JSON log line (logger)
//! ```

/// Error types, configuration and request context
pub mod core;

/// Metrics, logging and distributed tracing
pub mod observability;

/// HTTP routing, handlers and server lifecycle
pub mod server;

pub use self::core::config::AppConfig;
pub use self::core::error::{ServiceError, ServiceResult};
pub use self::core::types::RequestContext;
pub use self::server::{build_router, AppState};
