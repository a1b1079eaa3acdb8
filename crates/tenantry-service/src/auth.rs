//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs whose `sub` claim is the acting user's id. Identity
//! is all this layer establishes; what the user may do in a tenant is decided
//! by their membership there.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use tenantry_core::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// Expiration time, seconds since the epoch.
    pub exp: u64,
    /// Issued at.
    #[serde(default)]
    pub iat: u64,
}

/// An authenticated user extracted from the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
}

#[async_trait::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        let claims = verify_token(&state.config.jwt_secret, token)?;
        let user_id = claims.sub.parse::<UserId>().map_err(|_| {
            tracing::debug!(sub = %claims.sub, "JWT subject is not a user id");
            ApiError::Unauthorized
        })?;

        Ok(Self { user_id })
    }
}

/// Validate `token` and return its claims.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            ApiError::Unauthorized
        })
}

/// Sign a token for `user_id` valid for `ttl_seconds`.
///
/// Used by the demo seeding and the integration tests; production tokens
/// come from the identity provider sharing the secret.
pub fn issue_token(secret: &str, user_id: UserId, ttl_seconds: u64) -> Result<String, ApiError> {
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + ttl_seconds,
        iat: now,
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
}
