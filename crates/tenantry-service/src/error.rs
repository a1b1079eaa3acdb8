//! API error types and the failure envelope.
//!
//! Every failure leaves the service as
//! `{"ok": false, "error": <message>, "code": <stable code>, ...extra}`.
//! This is the single place where store conditions become status codes.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

use tenantry_store::{GuardViolation, StoreError};

use crate::validation::FieldIssues;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid bearer token.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated but lacking the membership or capability.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource (or tenant) not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request that is not a body validation problem.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Body is not parseable JSON.
    #[error("malformed json: {0}")]
    MalformedJson(String),

    /// Body parsed but failed validation.
    #[error("invalid input")]
    Validation(FieldIssues),

    /// Business conflict (duplicate sku, last owner, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Optimistic concurrency mismatch.
    #[error("version conflict: expected {expected}, current {current}")]
    VersionConflict {
        /// Version the caller sent.
        expected: i64,
        /// Version currently stored.
        current: i64,
    },

    /// Same idempotency fingerprint is still executing.
    #[error("request already in progress")]
    InProgress,

    /// Tenant isolation policy rejected a data access.
    #[error(transparent)]
    Guard(#[from] GuardViolation),

    /// Fixed window exhausted.
    #[error("too many requests")]
    RateLimited {
        /// Window limit.
        limit: u32,
        /// Requests left in the window.
        remaining: u32,
        /// Seconds until the window resets.
        retry_after: u64,
    },

    /// Internal server error. The detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Shorthand for the generic 403.
    #[must_use]
    pub fn forbidden() -> Self {
        Self::Forbidden("Forbidden".into())
    }

    /// Shorthand for the generic 404.
    #[must_use]
    pub fn not_found() -> Self {
        Self::NotFound("Not found".into())
    }

    /// A 422 with one form-level message.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        let mut issues = FieldIssues::default();
        issues.form(message);
        Self::Validation(issues)
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::MalformedJson(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) | Self::VersionConflict { .. } | Self::InProgress | Self::Guard(_) => {
                StatusCode::CONFLICT
            }
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message, extra) = match &self {
            Self::Unauthorized => ("unauthorized", "Unauthorized".to_string(), None),
            Self::Forbidden(msg) => ("forbidden", msg.clone(), None),
            Self::NotFound(msg) => ("not_found", msg.clone(), None),
            Self::BadRequest(msg) => ("bad_request", msg.clone(), None),
            Self::MalformedJson(detail) => {
                tracing::info!(event = "malformed_json", %detail);
                ("malformed_json", "Malformed JSON".to_string(), None)
            }
            Self::Validation(issues) => {
                tracing::info!(event = "validation_error", ?issues);
                ("invalid_input", "Invalid input".to_string(), Some(json!({ "issues": issues })))
            }
            Self::Conflict(msg) => ("conflict", msg.clone(), None),
            Self::VersionConflict { expected, current } => (
                "version_conflict",
                "Version conflict".to_string(),
                Some(json!({ "expected_version": expected, "current_version": current })),
            ),
            Self::InProgress => ("request_in_progress", "Request already in progress".to_string(), None),
            Self::Guard(violation) => {
                tracing::error!(table = violation.table, reason = %violation.reason, "Tenant guard violation");
                ("guard_violation", "Tenant isolation violation".to_string(), None)
            }
            Self::RateLimited { limit, retry_after, .. } => {
                tracing::warn!(event = "rate_limited", limit, retry_after);
                ("rate_limited", "Too Many Requests".to_string(), None)
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                ("internal_error", "Internal Server Error".to_string(), None)
            }
        };

        let mut body = Map::new();
        body.insert("ok".into(), Value::Bool(false));
        body.insert("error".into(), Value::String(message));
        body.insert("code".into(), Value::String(code.into()));
        if let Some(Value::Object(extra)) = extra {
            body.extend(extra);
        }

        let mut response = (status, Json(Value::Object(body))).into_response();
        if let Self::RateLimited { limit, remaining, retry_after } = self {
            let headers = response.headers_mut();
            headers.insert("retry-after", HeaderValue::from(retry_after));
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::not_found(),
            StoreError::VersionConflict { expected, current, .. } => {
                tracing::debug!(expected, current, "Version conflict");
                Self::VersionConflict { expected, current }
            }
            StoreError::UniqueViolation { table, constraint } => {
                tracing::warn!(table, %constraint, "Unique constraint violated");
                Self::Conflict(unique_message(&constraint).into())
            }
            StoreError::GuardViolation(violation) => Self::Guard(violation),
            StoreError::InvalidQuery(msg) | StoreError::Database(msg) | StoreError::Serialization(msg) => {
                Self::Internal(msg)
            }
        }
    }
}

fn unique_message(constraint: &str) -> &'static str {
    match constraint {
        "products_tenant_id_sku_key" => "SKU already exists for this tenant",
        "memberships_tenant_id_user_id_key" => "User is already a member of this tenant",
        "tenants_slug_key" => "Slug already taken",
        "domains_host_key" => "Host already mapped",
        _ => "Unique constraint violated",
    }
}
