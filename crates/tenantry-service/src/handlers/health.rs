//! Liveness and store reachability.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use tenantry_core::Tenant;
use tenantry_store::DataAccess;

use crate::state::AppState;

/// Id no tenant can carry; reading it is a single point read.
const CHECK_ID: &str = "health-check";

/// `GET /health` body.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `ok`, or `degraded` when the store cannot be read.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Deployment environment.
    pub environment: String,
    /// Storage backend state.
    pub store: StoreHealth,
    /// Cached host resolutions.
    pub tenant_cache_entries: u64,
}

/// Storage backend state.
#[derive(Debug, Serialize)]
pub struct StoreHealth {
    /// Configured backend.
    pub backend: String,
    /// Whether a read went through.
    pub reachable: bool,
}

/// Report liveness. Runs outside tenant resolution; 503 when the store
/// cannot be read.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthReport>) {
    let reachable = match state.system_db().find_unique::<Tenant>(CHECK_ID) {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(error = %e, "Health check could not read the store");
            false
        }
    };

    let report = HealthReport {
        status: if reachable { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.to_string(),
        store: StoreHealth {
            backend: state.config.store_backend.to_string(),
            reachable,
        },
        tenant_cache_entries: state.resolver.cached_entries(),
    };
    let status = if reachable { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(report))
}
