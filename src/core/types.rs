//! # Core Types
//!
//! Per-request data shared by the handlers and the observability collaborators.

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::{request::Parts, Method};

use crate::core::error::ServiceError;
use crate::observability::logging::CorrelationId;

/// Header carrying the caller-supplied correlation identifier
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request context extracted once per handler invocation
///
/// Lives only for the duration of the handler; nothing here is retained
/// after the response is sent.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    /// Query pairs in the order they appear in the URI
    pub query: Vec<(String, String)>,
    pub correlation_id: CorrelationId,
}

impl RequestContext {
    /// First value of a query parameter, if present
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map_err(|e| ServiceError::invalid_query("query", e.body_text()))?;

        let correlation_id = CorrelationId::from_header(parts.headers.get(REQUEST_ID_HEADER));

        Ok(Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query,
            correlation_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> RequestContext {
        let (mut parts, _) = request.into_parts();
        RequestContext::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_context_from_request() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/work?t=0.5&x=1")
            .header("X-Request-ID", "abc-123")
            .body(())
            .unwrap();

        let ctx = extract(request).await;
        assert_eq!(ctx.method, Method::GET);
        assert_eq!(ctx.path, "/work");
        assert_eq!(ctx.query_param("t"), Some("0.5"));
        assert_eq!(ctx.query_param("missing"), None);
        assert_eq!(ctx.correlation_id.as_str(), "abc-123");
    }

    #[tokio::test]
    async fn test_missing_request_id_uses_sentinel() {
        let request = Request::builder().uri("/").body(()).unwrap();
        let ctx = extract(request).await;
        assert_eq!(ctx.correlation_id.as_str(), "none");
        assert!(ctx.query.is_empty());
    }

    #[tokio::test]
    async fn test_first_query_value_wins() {
        let request = Request::builder()
            .uri("/work?t=1&t=2")
            .body(())
            .unwrap();
        let ctx = extract(request).await;
        assert_eq!(ctx.query_param("t"), Some("1"));
    }
}
