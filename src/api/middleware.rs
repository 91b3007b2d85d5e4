//! API Middleware
//!
//! Correlation id assignment and request logging.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::net::IpAddr;
use uuid::Uuid;

use crate::domain::OperationContext;

/// Header carrying the correlation id in both directions
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Headers never written to logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "x-api-key"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

/// First address of `X-Forwarded-For`, if it parses
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
}

/// Build the request's [`OperationContext`], reusing a caller-supplied
/// correlation id when it is a valid UUID.
pub fn context_from_headers(headers: &HeaderMap) -> OperationContext {
    let mut context = OperationContext::new();

    if let Some(id) = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
    {
        context = context.with_correlation_id(id);
    }
    if let Some(ip) = forwarded_ip(headers) {
        context = context.with_client_ip(ip);
    }
    context
}

// =========================================================================
// Context Middleware
// =========================================================================

/// Attach an [`OperationContext`] and echo its correlation id
pub async fn context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let context = context_from_headers(request.headers());
    let correlation_id = context.correlation_id;
    request.extensions_mut().insert(context);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let headers = mask_headers_for_logging(request.headers());

    let context = request.extensions().get::<OperationContext>().cloned();
    let correlation_id = context.as_ref().map(|ctx| ctx.correlation_id);
    let client_ip = context.as_ref().and_then(|ctx| ctx.client_ip);

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        correlation_id = ?correlation_id,
        client_ip = ?client_ip,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration_ms = context.as_ref().map(|ctx| ctx.elapsed_ms());
    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = ?duration_ms,
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_headers_for_logging() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("authorization", "Bearer secret".parse().unwrap());

        let masked = mask_headers_for_logging(&headers);

        let auth = masked.iter().find(|(k, _)| k == "authorization").unwrap();
        assert_eq!(auth.1, "[REDACTED]");
        let content_type = masked.iter().find(|(k, _)| k == "content-type").unwrap();
        assert_eq!(content_type.1, "application/json");
    }

    #[test]
    fn test_context_reuses_valid_correlation_id() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, id.to_string().parse().unwrap());
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());

        let context = context_from_headers(&headers);

        assert_eq!(context.correlation_id, id);
        assert_eq!(context.client_ip, Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_context_ignores_malformed_correlation_id() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, "not-a-uuid".parse().unwrap());

        let context = context_from_headers(&headers);

        assert_ne!(context.correlation_id.to_string(), "not-a-uuid");
        assert!(context.client_ip.is_none());
    }
}
