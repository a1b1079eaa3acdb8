//! The success envelope.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use crate::error::ApiError;

/// Header set on responses served from a stored idempotent result.
pub const REPLAY_HEADER: &str = "idempotent-replayed";

/// A serialized `{"ok": true, "data": ...}` response.
///
/// The body is kept as the exact bytes sent, so the idempotency coordinator
/// can store it and later replay it byte for byte.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Status code.
    pub status: StatusCode,
    /// Serialized JSON body.
    pub body: String,
    replayed: bool,
}

impl Envelope {
    /// Wrap `data` with status 200.
    pub fn ok<T: Serialize>(data: &T) -> Result<Self, ApiError> {
        Self::with_status(StatusCode::OK, data)
    }

    /// Wrap `data` with status 201.
    pub fn created<T: Serialize>(data: &T) -> Result<Self, ApiError> {
        Self::with_status(StatusCode::CREATED, data)
    }

    /// Wrap `data` with an explicit status.
    pub fn with_status<T: Serialize>(status: StatusCode, data: &T) -> Result<Self, ApiError> {
        let body = serde_json::to_string(&json!({ "ok": true, "data": data }))
            .map_err(|e| ApiError::Internal(format!("response serialization failed: {e}")))?;
        Ok(Self { status, body, replayed: false })
    }

    /// Rebuild a stored response.
    #[must_use]
    pub fn replay(status: u16, body: String) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
            body,
            replayed: true,
        }
    }

    /// Whether this came from the idempotency store.
    #[must_use]
    pub const fn is_replay(&self) -> bool {
        self.replayed
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let mut response = (
            self.status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            self.body,
        )
            .into_response();
        if self.replayed {
            response.headers_mut().insert(REPLAY_HEADER, HeaderValue::from_static("true"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_the_ok_envelope() {
        let env = Envelope::created(&json!({"id": 1})).unwrap();
        assert_eq!(env.status, StatusCode::CREATED);
        let parsed: serde_json::Value = serde_json::from_str(&env.body).unwrap();
        assert_eq!(parsed, json!({"ok": true, "data": {"id": 1}}));
    }

    #[test]
    fn replay_keeps_bytes_and_marks_header() {
        let response = Envelope::replay(201, "{\"ok\":true}".into()).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[REPLAY_HEADER], "true");
    }
}
