//! Route handlers.
//!
//! `/` and `/work` are instrumented: each invocation opens exactly one span,
//! records one latency sample, increments the request counter once and emits
//! one log record. `/metrics` and `/health` have no side effects.

use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::AppState;
use crate::core::error::{ServiceError, ServiceResult};
use crate::core::types::RequestContext;
use crate::observability::metrics::EXPOSITION_CONTENT_TYPE;

pub const ROOT_ROUTE: &str = "/";
pub const WORK_ROUTE: &str = "/work";
pub const HEALTH_ROUTE: &str = "/health";

/// Name of the query parameter carrying the requested delay
pub const DELAY_PARAM: &str = "t";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkResponse {
    pub worked: bool,
    /// The delay as requested, before clamping
    pub delay: f64,
}

/// `GET /`
pub async fn hello(State(state): State<AppState>, ctx: RequestContext) -> Json<HelloResponse> {
    let started = Instant::now();
    let span = state.tracer.start_span("hello-handler", &ctx);

    tokio::time::sleep(state.config.work.root_delay)
        .instrument(span)
        .await;

    state.record(&ctx, ROOT_ROUTE, StatusCode::OK, started.elapsed());
    state.logger.info("handled root", &ctx, None);

    Json(HelloResponse {
        message: "hello world".to_string(),
    })
}

/// `GET /work?t=<seconds>`
///
/// Sleeps for `t` seconds capped at the configured maximum and reports the
/// uncapped value back.
pub async fn work(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ServiceResult<Json<WorkResponse>> {
    let started = Instant::now();
    let span = state.tracer.start_span("work-handler", &ctx);
    let limits = &state.config.work;

    let outcome = async {
        let requested = parse_delay(ctx.query_param(DELAY_PARAM), limits.default_delay_secs)?;
        tokio::time::sleep(effective_delay(requested, limits.max_delay_secs)).await;
        Ok::<f64, ServiceError>(requested)
    }
    .instrument(span)
    .await;

    let status = match &outcome {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status_code(),
    };
    state.record(&ctx, WORK_ROUTE, status, started.elapsed());

    match outcome {
        Ok(delay) => {
            state.logger.info("handled work", &ctx, Some(delay));
            Ok(Json(WorkResponse {
                worked: true,
                delay,
            }))
        }
        Err(e) => {
            state.logger.warn("rejected work", &ctx, None);
            Err(e)
        }
    }
}

/// Prometheus scrape endpoint
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        state.metrics.snapshot(),
    )
}

/// `GET /health`
pub async fn health() -> &'static str {
    "OK"
}

pub async fn not_found(uri: Uri) -> ServiceError {
    ServiceError::not_found(uri.path())
}

/// Interpret the `t` query parameter
///
/// Absent means `default`. Anything that is not a finite, non-negative number
/// of seconds is a client error.
pub fn parse_delay(raw: Option<&str>, default: f64) -> ServiceResult<f64> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    let value: f64 = raw.trim().parse().map_err(|_| {
        ServiceError::invalid_query(
            DELAY_PARAM,
            format!("'{}' is not a number of seconds", raw),
        )
    })?;

    if !value.is_finite() {
        return Err(ServiceError::invalid_query(DELAY_PARAM, "delay must be finite"));
    }
    if value < 0.0 {
        return Err(ServiceError::invalid_query(
            DELAY_PARAM,
            "delay must not be negative",
        ));
    }

    Ok(value)
}

/// The delay actually slept: `requested` capped at `max_secs`
///
/// Values too large for a `Duration` saturate instead of panicking.
pub fn effective_delay(requested: f64, max_secs: f64) -> Duration {
    Duration::try_from_secs_f64(requested.min(max_secs).max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delay_default() {
        assert_eq!(parse_delay(None, 0.1).unwrap(), 0.1);
    }

    #[test]
    fn test_parse_delay_values() {
        assert_eq!(parse_delay(Some("0"), 0.1).unwrap(), 0.0);
        assert_eq!(parse_delay(Some("1.5"), 0.1).unwrap(), 1.5);
        assert_eq!(parse_delay(Some(" 0.25 "), 0.1).unwrap(), 0.25);
        assert_eq!(parse_delay(Some("5"), 0.1).unwrap(), 5.0);
        assert_eq!(parse_delay(Some("1e300"), 0.1).unwrap(), 1e300);
    }

    #[test]
    fn test_parse_delay_rejects_garbage() {
        for raw in ["abc", "", "1s", "inf", "1e309", "NaN", "-1"] {
            let err = parse_delay(Some(raw), 0.1).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "input {:?}", raw);
        }
    }

    #[test]
    fn test_effective_delay_is_clamped() {
        assert_eq!(effective_delay(0.5, 2.0), Duration::from_millis(500));
        assert_eq!(effective_delay(2.0, 2.0), Duration::from_secs(2));
        assert_eq!(effective_delay(30.0, 2.0), Duration::from_secs(2));
        assert_eq!(effective_delay(0.0, 2.0), Duration::ZERO);
    }

    #[test]
    fn test_effective_delay_saturates_on_huge_limit() {
        assert_eq!(effective_delay(1e30, 1e20), Duration::MAX);
        assert_eq!(effective_delay(f64::MAX, f64::MAX), Duration::MAX);
    }
}
