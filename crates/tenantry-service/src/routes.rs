//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, members, products, public, storefront, tenant};
use crate::pipeline::{handle_panic, ip_rate_limit};
use crate::state::AppState;
use crate::tenant::{admin_tenant, public_tenant};

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests on the public and storefront routes.
const PUBLIC_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests on the admin routes.
const ADMIN_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## No pipeline
/// - `GET /health` - Health check
///
/// ## Public (host resolution only)
/// - `GET /api/public/ping` - Tenant served on this host
/// - `GET /api/storefront/tenants/:slug/products` - Active catalog
/// - `GET /api/storefront/tenants/:slug/products/:sku` - One active product
///
/// ## Admin (host, then cookie; Bearer JWT; membership)
/// - `GET /api/tenant/current` - Bound tenant
/// - `POST /api/tenant/select` - Set the tenant cookie
/// - `GET/POST /api/admin/products`
/// - `GET/PATCH/DELETE /api/admin/products/:id`
/// - `GET/POST /api/admin/members`
/// - `GET/PATCH/DELETE /api/admin/members/:id`
///
/// Both pipelines count non-GET requests against the per-IP window before
/// the tenant is established.
pub fn create_router(state: AppState) -> Router {
    create_shared_router(Arc::new(state))
}

/// [`create_router`] over state that is also used elsewhere, such as the
/// background retention sweep.
pub fn create_shared_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let public_routes = Router::new()
        .route("/api/public/ping", get(public::ping))
        .route("/api/storefront/tenants/:slug/products", get(storefront::list_products))
        .route("/api/storefront/tenants/:slug/products/:sku", get(storefront::get_product))
        .route_layer(from_fn_with_state(Arc::clone(&state), public_tenant))
        .route_layer(from_fn_with_state(Arc::clone(&state), ip_rate_limit))
        .layer(ConcurrencyLimitLayer::new(PUBLIC_MAX_CONCURRENT_REQUESTS));

    let admin_routes = Router::new()
        .route("/api/tenant/current", get(tenant::current))
        .route("/api/tenant/select", post(tenant::select))
        .route("/api/admin/products", get(products::list).post(products::create))
        .route(
            "/api/admin/products/:id",
            get(products::get).patch(products::update).delete(products::delete),
        )
        .route("/api/admin/members", get(members::list).post(members::create))
        .route(
            "/api/admin/members/:id",
            get(members::get).patch(members::update).delete(members::delete),
        )
        .route_layer(from_fn_with_state(Arc::clone(&state), admin_tenant))
        .route_layer(from_fn_with_state(Arc::clone(&state), ip_rate_limit))
        .layer(ConcurrencyLimitLayer::new(ADMIN_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .merge(public_routes)
        .merge(admin_routes)
        // Global middleware
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(request_timeout_seconds)))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
