//! # Structured Logging
//!
//! This module wires the `tracing` subscriber stack and provides the per-request
//! logger injected into handlers.
//!
//! ## Key Features
//! - Single-line JSON records on stdout, fields flattened to the top level
//! - Human-readable text output for local development
//! - Correlation IDs taken from `X-Request-ID`, defaulting to `none`
//! - `RUST_LOG` overrides the configured level
//!
//! Writes go through `tracing-subscriber`'s formatter, which drops I/O errors
//! instead of propagating them, so a broken stdout never fails a request.

use axum::http::HeaderValue;
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::core::error::{ServiceError, ServiceResult};
use crate::core::types::RequestContext;
use crate::observability::config::{LogConfig, LogFormat};

/// Correlation ID for joining log lines of one logical request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Value used when the caller supplied no identifier
    pub const NONE: &'static str = "none";

    /// Read the identifier from a header value, passing it through unvalidated
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        match value {
            Some(value) => Self(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            None => Self::default(),
        }
    }

    /// Get the correlation ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self(Self::NONE.to_string())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// JSON formatting layer writing one flattened object per event
pub fn json_layer<S, W>(writer: W) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_target(true)
        .with_writer(writer)
}

/// Human-readable formatting layer
pub fn text_layer<S, W>(writer: W) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer().with_target(true).with_writer(writer)
}

/// Build the level filter; `RUST_LOG` wins over the configured level
pub fn env_filter(config: &LogConfig) -> ServiceResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            ServiceError::config(format!("Invalid log level '{}': {}", config.level, e))
        }),
    }
}

/// Install the process subscriber: level filter, formatter and the given trace layer
///
/// Called once from `main`; the library itself never touches global logging state.
pub fn init_subscriber<L>(config: &LogConfig, trace_layer: L) -> ServiceResult<()>
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    let filter = env_filter(config)?;

    let format_layer = match config.format {
        LogFormat::Json => json_layer(std::io::stdout).boxed(),
        LogFormat::Text => text_layer(std::io::stdout).boxed(),
    };

    tracing_subscriber::registry()
        .with(trace_layer)
        .with(format_layer)
        .with(filter)
        .try_init()
        .map_err(|e| ServiceError::internal(format!("Failed to install subscriber: {}", e)))
}

/// Per-request structured logger
///
/// Stamps every record with the logger name and the request's correlation
/// fields. Cheap to share; holds no mutable state.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    name: String,
}

impl StructuredLogger {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }

    /// Emit one record for a request at the given level
    pub fn log(&self, level: Level, message: &str, ctx: &RequestContext, delay: Option<f64>) {
        macro_rules! emit {
            ($level:expr) => {
                tracing::event!(
                    $level,
                    logger = %self.name,
                    request_id = %ctx.correlation_id,
                    method = %ctx.method,
                    path = %ctx.path,
                    delay,
                    "{}",
                    message
                )
            };
        }

        match level {
            Level::ERROR => emit!(Level::ERROR),
            Level::WARN => emit!(Level::WARN),
            Level::INFO => emit!(Level::INFO),
            Level::DEBUG => emit!(Level::DEBUG),
            _ => emit!(Level::TRACE),
        }
    }

    pub fn info(&self, message: &str, ctx: &RequestContext, delay: Option<f64>) {
        self.log(Level::INFO, message, ctx, delay);
    }

    pub fn warn(&self, message: &str, ctx: &RequestContext, delay: Option<f64>) {
        self.log(Level::WARN, message, ctx, delay);
    }
}
