//! Request extractors shared by the handlers.
//!
//! - [`ApiJson`] - JSON bodies with envelope-shaped rejections
//! - [`AdminCtx`] - authenticated member of the bound tenant
//! - [`PublicTenant`] - the host-resolved tenant on public routes
//! - [`IdempotencyKey`] - the `Idempotency-Key` header plus method and path
//! - [`RequestMeta`] - client IP and user agent for audit entries

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, OriginalUri, Request};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use tenantry_core::{Capability, Fingerprint, Membership, TenantId, UserId, MAX_IDEMPOTENCY_KEY_LEN};
use tenantry_store::{DataAccess, Filter, TenantDb};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::pipeline::client_ip;
use crate::state::AppState;
use crate::tenant::{self, TenantContext};

/// Header carrying the caller's idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

// ============================================================================
// JSON bodies
// ============================================================================

/// `Json<T>` whose rejections use the failure envelope.
///
/// Unparseable bodies are 400 `malformed_json`; bodies that parse but do not
/// fit `T` (missing or unknown fields, wrong types) are 422.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

#[async_trait::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(JsonRejection::JsonSyntaxError(e)) => Err(ApiError::MalformedJson(e.body_text())),
            Err(JsonRejection::JsonDataError(e)) => Err(ApiError::invalid(e.body_text())),
            Err(JsonRejection::MissingJsonContentType(_)) => {
                Err(ApiError::BadRequest("Expected Content-Type: application/json".into()))
            }
            Err(other) => Err(ApiError::BadRequest(other.body_text())),
        }
    }
}

// ============================================================================
// Client metadata
// ============================================================================

/// Client IP and user agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    /// Best-effort client address.
    pub ip: String,
    /// `User-Agent`, if sent.
    pub user_agent: Option<String>,
}

impl RequestMeta {
    fn from_parts(parts: &Parts) -> Self {
        Self {
            ip: client_ip(&parts.headers),
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string),
        }
    }
}

#[async_trait::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

// ============================================================================
// Idempotency key
// ============================================================================

/// The `Idempotency-Key` header with the method and path it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey {
    /// Trimmed key; `None` when absent or blank.
    pub key: Option<String>,
    method: String,
    path: String,
}

impl IdempotencyKey {
    /// The fingerprint for this request, if a key was sent.
    #[must_use]
    pub fn fingerprint(&self, user_id: Option<UserId>, tenant_id: Option<TenantId>) -> Option<Fingerprint> {
        self.key
            .as_deref()
            .map(|key| Fingerprint::new(key, &self.method, &self.path, user_id, tenant_id))
    }
}

#[async_trait::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for IdempotencyKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(IDEMPOTENCY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(ToString::to_string);

        if key.as_ref().is_some_and(|k| k.chars().count() > MAX_IDEMPOTENCY_KEY_LEN) {
            return Err(ApiError::BadRequest("Idempotency-Key too long".into()));
        }

        let path = parts
            .extensions
            .get::<OriginalUri>()
            .map_or_else(|| parts.uri.path(), |uri| uri.0.path())
            .to_string();

        Ok(Self {
            key,
            method: parts.method.as_str().to_string(),
            path,
        })
    }
}

// ============================================================================
// Tenant-bound actors
// ============================================================================

/// The tenant bound on a public route. Rejects with 404 when none resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicTenant(pub TenantContext);

#[async_trait::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for PublicTenant {
    type Rejection = ApiError;

    async fn from_request_parts(_parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = tenant::current();
        if ctx.tenant_id.is_none() {
            return Err(ApiError::not_found());
        }
        Ok(Self(ctx))
    }
}

/// An authenticated user acting inside the bound tenant.
///
/// Extraction checks, in order: bearer token (401), bound tenant (404),
/// membership in that tenant (403). Capabilities are checked by the handler
/// through [`AdminCtx::require`].
#[derive(Debug, Clone)]
pub struct AdminCtx {
    /// Acting user.
    pub user: AuthUser,
    /// Bound tenant.
    pub tenant_id: TenantId,
    /// Guarded handle for the bound tenant.
    pub db: TenantDb,
    /// The actor's membership in the bound tenant.
    pub membership: Membership,
    /// Client metadata for audit entries.
    pub meta: RequestMeta,
}

impl AdminCtx {
    /// The acting user's id.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user.user_id
    }

    /// 403 unless the membership grants `capability`.
    pub fn require(&self, capability: Capability) -> Result<(), ApiError> {
        if self.membership.has(capability) {
            Ok(())
        } else {
            tracing::debug!(user_id = %self.user_id(), tenant_id = %self.tenant_id, ?capability, "Capability missing");
            Err(ApiError::forbidden())
        }
    }

    /// Count one mutation against the per-user window.
    pub fn limit_user(&self, state: &AppState) -> Result<(), ApiError> {
        state
            .rate_limiter
            .check(
                &format!("mut:user:{}", self.user_id()),
                state.config.rl_mutation_per_user,
                state.config.rate_window(),
            )
            .into_result()
            .map(|_| ())
    }

    /// Fingerprint scoped to this actor and tenant.
    #[must_use]
    pub fn fingerprint(&self, key: &IdempotencyKey) -> Option<Fingerprint> {
        key.fingerprint(Some(self.user_id()), Some(self.tenant_id))
    }
}

#[async_trait::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminCtx {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        let tenant_id = tenant::current_tenant_id().ok_or_else(|| ApiError::NotFound("Tenant not resolved".into()))?;

        let db = state.tenant_db(tenant_id);
        let membership: Membership = db
            .find_first(Filter::eq("user_id", user.user_id))?
            .ok_or_else(|| {
                tracing::info!(user_id = %user.user_id, %tenant_id, "Not a member of the bound tenant");
                ApiError::forbidden()
            })?;

        Ok(Self {
            user,
            tenant_id,
            db,
            membership,
            meta: RequestMeta::from_parts(parts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    async fn key_of(req: HttpRequest<()>) -> Result<IdempotencyKey, ApiError> {
        let (mut parts, ()) = req.into_parts();
        IdempotencyKey::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn idempotency_key_is_trimmed_and_scoped_to_path() {
        let req = HttpRequest::post("/api/admin/products?dry=1")
            .header(IDEMPOTENCY_HEADER, "  abc  ")
            .body(())
            .unwrap();
        let key = key_of(req).await.unwrap();
        let fp = key.fingerprint(None, None).unwrap();
        assert_eq!(fp.key, "abc");
        assert_eq!(fp.method, "POST");
        assert_eq!(fp.path, "/api/admin/products");
    }

    #[tokio::test]
    async fn blank_key_means_not_requested() {
        let req = HttpRequest::post("/x").header(IDEMPOTENCY_HEADER, "   ").body(()).unwrap();
        assert_eq!(key_of(req).await.unwrap().fingerprint(None, None), None);
    }

    #[tokio::test]
    async fn overlong_key_is_rejected() {
        let req = HttpRequest::post("/x")
            .header(IDEMPOTENCY_HEADER, "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1))
            .body(())
            .unwrap();
        assert!(matches!(key_of(req).await, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn public_tenant_requires_a_binding() {
        let (mut parts, ()) = HttpRequest::get("/").body(()).unwrap().into_parts();
        assert!(PublicTenant::from_request_parts(&mut parts, &()).await.is_err());

        let t = TenantId::generate();
        let ctx = TenantContext::bound(t, tenant::TenantSource::Host);
        let found = tenant::context::scope(ctx, PublicTenant::from_request_parts(&mut parts, &()))
            .await
            .unwrap();
        assert_eq!(found.0.tenant_id, Some(t));
    }
}
