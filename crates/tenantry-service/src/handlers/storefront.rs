//! Public catalog, addressed by tenant slug.
//!
//! These routes ignore the host-bound context: the slug in the path picks
//! the tenant. Only active products are listed, newest first, and nothing
//! internal (ids, versions, tenant ids) leaves through them.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use tenantry_core::{Product, PublicProduct, Tenant};
use tenantry_store::{DataAccess, Filter, OrderBy, Page, TenantDb};

use super::{search_filter, ListQuery};
use crate::error::ApiError;
use crate::response::Envelope;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 50;

/// Public view of a tenant.
#[derive(Debug, Clone, Serialize)]
pub struct PublicTenant {
    /// URL slug.
    pub slug: String,
    /// Display name.
    pub name: String,
}

/// Storefront listing.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    /// The tenant.
    pub tenant: PublicTenant,
    /// Active products on this page.
    pub products: Vec<PublicProduct>,
    /// Offset of the next page, when this one was full.
    pub next_offset: Option<usize>,
}

/// One storefront product.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogItem {
    /// The tenant.
    pub tenant: PublicTenant,
    /// The product.
    pub product: PublicProduct,
}

/// `GET /api/storefront/tenants/:slug/products`
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let (tenant, db) = tenant_by_slug(&state, &slug)?;

    let limit = query.limit(DEFAULT_LIMIT, MAX_LIMIT);
    let offset = query.offset();
    let mut filter = Filter::eq("is_active", true);
    if let Some(q) = query.search() {
        filter = filter.and(search_filter(q, &["sku", "name", "description"]));
    }

    let products: Vec<Product> =
        db.find_many(filter, Page::ordered(OrderBy::desc("created_at")).limit(limit).offset(offset))?;
    let next_offset = (products.len() == limit).then_some(offset + limit);

    let body = Envelope::ok(&Catalog {
        tenant: public(tenant),
        products: products.into_iter().map(PublicProduct::from).collect(),
        next_offset,
    })?;
    Ok(cached(body, "public, max-age=30"))
}

/// `GET /api/storefront/tenants/:slug/products/:sku`
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path((slug, sku)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (tenant, db) = tenant_by_slug(&state, &slug)?;

    let product: Product = db
        .find_first(Filter::eq("sku", sku.as_str()).and(Filter::eq("is_active", true)))?
        .ok_or_else(|| ApiError::NotFound("Product not found".into()))?;

    let body = Envelope::ok(&CatalogItem {
        tenant: public(tenant),
        product: product.into(),
    })?;
    Ok(cached(body, "public, max-age=60"))
}

fn tenant_by_slug(state: &AppState, slug: &str) -> Result<(Tenant, TenantDb), ApiError> {
    let tenant: Tenant = state
        .system_db()
        .find_first(Filter::eq("slug", slug.trim().to_ascii_lowercase()))?
        .ok_or_else(|| ApiError::NotFound("Tenant not found".into()))?;
    let db = state.tenant_db(tenant.id);
    Ok((tenant, db))
}

fn public(tenant: Tenant) -> PublicTenant {
    PublicTenant {
        slug: tenant.slug,
        name: tenant.name,
    }
}

fn cached(body: Envelope, policy: &'static str) -> Response {
    let mut response = body.into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(policy));
    response
}
