//! Application state.

use std::sync::Arc;

use tenantry_core::TenantId;
use tenantry_store::{Store, SystemDb, TenantDb};

use crate::config::ServiceConfig;
use crate::idempotency::IdempotencyCoordinator;
use crate::rate_limit::RateLimiter;
use crate::tenant::TenantResolver;

/// Application state shared across handlers.
pub struct AppState {
    /// The storage backend. Handlers only reach it through a guarded handle.
    store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Host to tenant resolution.
    pub resolver: TenantResolver,

    /// Process-local fixed-window counters.
    pub rate_limiter: RateLimiter,

    /// Idempotency reservation and replay.
    pub idempotency: IdempotencyCoordinator,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let system = SystemDb::new(Arc::clone(&store));
        let resolver = TenantResolver::new(
            system.clone(),
            config.is_production(),
            config.tenant_cache_ttl(),
            config.tenant_cache_max_entries,
        );

        if config.is_production() && config.jwt_secret == crate::config::DEV_JWT_SECRET {
            tracing::warn!("JWT_SECRET is the development default - set it before serving real traffic");
        }

        Self {
            store,
            config,
            resolver,
            rate_limiter: RateLimiter::new(),
            idempotency: IdempotencyCoordinator::new(system),
        }
    }

    /// Handle for the system tables (tenants, domains, users, idempotency).
    #[must_use]
    pub fn system_db(&self) -> SystemDb {
        SystemDb::new(Arc::clone(&self.store))
    }

    /// Guarded handle bound to `tenant_id`.
    #[must_use]
    pub fn tenant_db(&self, tenant_id: TenantId) -> TenantDb {
        TenantDb::new(Arc::clone(&self.store), tenant_id)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("environment", &self.config.environment)
            .field("store_backend", &self.config.store_backend)
            .finish_non_exhaustive()
    }
}
