//! Client error types.

/// Errors that can occur when using the tenantry client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The row changed since the caller read it.
    #[error("version conflict: expected {expected}, current {current}")]
    VersionConflict {
        /// Version the caller sent.
        expected: i64,
        /// Version now stored.
        current: i64,
    },

    /// Missing row, unknown tenant, or a row owned by another tenant.
    #[error("not found: {0}")]
    NotFound(String),

    /// Mutation window exhausted.
    #[error("rate limited, retry after {retry_after}s")]
    RateLimited {
        /// Seconds until the window resets.
        retry_after: u64,
    },

    /// The idempotency key is still held by an earlier attempt.
    #[error("request already in progress")]
    InProgress,

    /// The body was rejected.
    #[error("invalid input: {issues}")]
    Validation {
        /// `{ form_errors, field_errors }` as sent by the server.
        issues: serde_json::Value,
    },

    /// Server returned any other error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Whether resending the same request with the same key may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::InProgress => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
