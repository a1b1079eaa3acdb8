//! Cross-cutting request pipeline pieces: the per-IP mutation limit, client
//! address detection and the panic handler.

use std::any::Any;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

const FALLBACK_IP: &str = "127.0.0.1";

/// Best-effort client address: first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then loopback.
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(FALLBACK_IP)
        .to_string()
}

/// Everything but GET counts, HEAD and OPTIONS included.
fn is_mutation(method: &Method) -> bool {
    *method != Method::GET
}

/// Count mutating requests against the per-IP window.
pub async fn ip_rate_limit(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    if !is_mutation(req.method()) {
        return next.run(req).await;
    }

    let ip = client_ip(req.headers());
    let stats = state.rate_limiter.check(
        &format!("mut:ip:{ip}"),
        state.config.rl_mutation_per_ip,
        state.config.rate_window(),
    );
    let stats = match stats.into_result() {
        Ok(stats) => stats,
        Err(err) => {
            tracing::warn!(%ip, method = %req.method(), path = %req.uri().path(), "Per-IP mutation limit hit");
            return err.into_response();
        }
    };

    let mut response = next.run(req).await;
    // A per-user rejection further in reports its own window.
    let headers = response.headers_mut();
    headers.entry("x-ratelimit-limit").or_insert(HeaderValue::from(stats.limit));
    headers.entry("x-ratelimit-remaining").or_insert(HeaderValue::from(stats.remaining));
    response
}

/// Render a handler panic as a 500 envelope.
#[allow(clippy::needless_pass_by_value)]
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn real_ip_then_loopback() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "127.0.0.1");
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers), "198.51.100.2");
    }

    #[test]
    fn only_get_skips_the_mutation_limit() {
        assert!(!is_mutation(&Method::GET));
        assert!(is_mutation(&Method::HEAD));
        assert!(is_mutation(&Method::OPTIONS));
        assert!(is_mutation(&Method::POST));
        assert!(is_mutation(&Method::DELETE));
    }

    #[test]
    fn panic_becomes_500() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
