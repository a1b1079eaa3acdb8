//! Request-scoped tenant binding.
//!
//! The binding lives in a tokio task-local that is set for exactly the
//! duration of one request future. Concurrent requests run in their own
//! scopes and never observe each other's binding; once the scope future
//! completes (or is dropped) the binding is gone.

use std::future::Future;

use serde::{Deserialize, Serialize};

use tenantry_core::TenantId;

/// How the tenant of a request was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantSource {
    /// A verified (or, outside production, pending) domain mapping.
    Host,
    /// The `tenant_id` cookie on an admin request.
    Cookie,
    /// Test override header (non-production only).
    Header,
    /// Test override query parameter (non-production only).
    Query,
    /// Nothing resolved.
    None,
}

/// The tenant bound to the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    /// Bound tenant, if any.
    pub tenant_id: Option<TenantId>,
    /// Where it came from.
    pub source: TenantSource,
}

impl TenantContext {
    /// The unbound context.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            tenant_id: None,
            source: TenantSource::None,
        }
    }

    /// A context bound to `tenant_id`.
    #[must_use]
    pub const fn bound(tenant_id: TenantId, source: TenantSource) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            source,
        }
    }
}

tokio::task_local! {
    static CURRENT: TenantContext;
}

/// Run `f` with `ctx` as the current tenant context.
pub async fn scope<F: Future>(ctx: TenantContext, f: F) -> F::Output {
    CURRENT.scope(ctx, f).await
}

/// The current context, or [`TenantContext::none`] outside any scope.
#[must_use]
pub fn current() -> TenantContext {
    CURRENT.try_with(|ctx| *ctx).unwrap_or(TenantContext::none())
}

/// Shorthand for `current().tenant_id`.
#[must_use]
pub fn current_tenant_id() -> Option<TenantId> {
    current().tenant_id
}
