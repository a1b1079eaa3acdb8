//! Current tenant and tenant switching.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use tenantry_core::{Membership, Tenant, TenantId};
use tenantry_store::{DataAccess, Filter};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::extract::{AdminCtx, ApiJson};
use crate::response::Envelope;
use crate::state::AppState;
use crate::tenant::middleware::tenant_cookie;
use crate::tenant::{self, TenantSource};
use crate::validation::TenantSelect;

/// `GET /api/tenant/current` payload.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentTenant {
    /// Bound tenant.
    pub tenant_id: TenantId,
    /// Tenant slug.
    pub slug: String,
    /// Tenant display name.
    pub name: String,
    /// How the tenant was resolved.
    pub source: TenantSource,
}

/// `GET /api/tenant/current`
pub async fn current(State(state): State<Arc<AppState>>, ctx: AdminCtx) -> Result<Envelope, ApiError> {
    let tenant: Tenant = state
        .system_db()
        .find_first(Filter::eq("id", ctx.tenant_id))?
        .ok_or_else(|| ApiError::NotFound("Tenant not resolved".into()))?;

    Envelope::ok(&CurrentTenant {
        tenant_id: tenant.id,
        slug: tenant.slug,
        name: tenant.name,
        source: tenant::current().source,
    })
}

/// `POST /api/tenant/select` - set the `tenant_id` cookie after checking
/// the caller belongs to the requested tenant.
///
/// A host-resolved tenant still wins on later requests; the cookie only
/// matters where the host does not resolve.
pub async fn select(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<ApiJson<TenantSelect>, ApiError>,
) -> Result<Response, ApiError> {
    let ApiJson(body) = body?;
    let tenant_id = body.tenant_id()?;

    let membership: Option<Membership> = state
        .tenant_db(tenant_id)
        .find_first(Filter::eq("user_id", user.user_id))?;
    if membership.is_none() {
        tracing::info!(user_id = %user.user_id, %tenant_id, "Tenant selection refused");
        return Err(ApiError::forbidden());
    }

    let cookie = tenant_cookie(tenant_id, state.config.is_production())?;
    tracing::info!(user_id = %user.user_id, %tenant_id, "Tenant selected");
    let body = Envelope::ok(&serde_json::json!({ "tenant_id": tenant_id }))?;
    Ok(([(SET_COOKIE, cookie)], body).into_response())
}
