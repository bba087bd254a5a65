//! # Error Handling Module
//!
//! This module provides the error type shared by every part of the service, built on
//! the `thiserror` crate. Each variant maps to an HTTP status code so handlers can
//! return `ServiceResult<T>` and let axum turn failures into JSON error responses.
//!
//! ## Error Categories
//! - Client errors (malformed query parameters, unknown routes) become 4xx responses
//! - Startup errors (configuration, exporter construction, I/O) abort the process
//!   before the listener is bound and never reach a request
//!
//! Exporter failures at runtime are not represented here at all: they are logged
//! and dropped, never surfaced to a caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the service
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error types for the demo service
///
/// The `#[error("...")]` attribute from `thiserror` implements `Display`
/// with the given message.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    /// Invalid or missing configuration (bad environment override, unreadable file, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A query parameter could not be interpreted
    #[error("Invalid query parameter '{param}': {reason}")]
    InvalidQuery { param: String, reason: String },

    /// No route matches the request path
    #[error("No route for path: {path}")]
    NotFound { path: String },

    /// Metrics or trace exporter could not be constructed
    #[error("Telemetry error: {message}")]
    Telemetry { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (listener bind, config file reads, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl ServiceError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid query parameter error
    pub fn invalid_query<P: Into<String>, R: Into<String>>(param: P, reason: R) -> Self {
        Self::InvalidQuery {
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error for the given path
    pub fn not_found<S: Into<String>>(path: S) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a telemetry error with a custom message
    pub fn telemetry<S: Into<String>>(message: S) -> Self {
        Self::Telemetry {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code returned to clients for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidQuery { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Configuration { .. }
            | Self::Telemetry { .. }
            | Self::Internal { .. }
            | Self::Io { .. }
            | Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::InvalidQuery { .. } => "invalid_query",
            Self::NotFound { .. } => "not_found",
            Self::Telemetry { .. } => "telemetry_error",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ServiceError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<metrics_exporter_prometheus::BuildError> for ServiceError {
    fn from(err: metrics_exporter_prometheus::BuildError) -> Self {
        Self::Telemetry {
            message: err.to_string(),
        }
    }
}

/// Errors render as a structured JSON body with the mapped status code
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}
