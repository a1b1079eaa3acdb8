//! Admin product catalog.
//!
//! Mutations run in this order: capability, per-user rate limit, body
//! validation, idempotency reservation, the write, the audit entry.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use serde_json::{json, Map, Value};

use tenantry_core::{diff_for_update, Capability, Product, ProductId, DEFAULT_CURRENCY};
use tenantry_store::{update_versioned, DataAccess, Filter, OrderBy, Page};

use super::{search_filter, ListQuery, Paged};
use crate::audit;
use crate::error::ApiError;
use crate::extract::{AdminCtx, ApiJson, IdempotencyKey};
use crate::response::Envelope;
use crate::state::AppState;
use crate::validation::{ProductCreate, ProductUpdate};

const DEFAULT_LIMIT: usize = 25;
const MAX_LIMIT: usize = 100;
const ENTITY: &str = "Product";

/// `GET /api/admin/products`
pub async fn list(ctx: AdminCtx, Query(query): Query<ListQuery>) -> Result<Envelope, ApiError> {
    ctx.require(Capability::ViewProducts)?;

    let limit = query.limit(DEFAULT_LIMIT, MAX_LIMIT);
    let offset = query.offset();
    let filter = query
        .search()
        .map_or(Filter::All, |q| search_filter(q, &["sku", "name", "description"]));

    let products: Vec<Product> = ctx.db.find_many(
        filter,
        Page::ordered(OrderBy::desc("created_at")).limit(limit).offset(offset),
    )?;
    Envelope::ok(&Paged::new(products, limit, offset))
}

/// `GET /api/admin/products/:id`
pub async fn get(ctx: AdminCtx, Path(id): Path<String>) -> Result<Envelope, ApiError> {
    ctx.require(Capability::ViewProducts)?;
    let product = find(&ctx, &id)?;
    Envelope::ok(&product)
}

/// `POST /api/admin/products`
pub async fn create(
    State(state): State<Arc<AppState>>,
    ctx: AdminCtx,
    key: IdempotencyKey,
    body: Result<ApiJson<ProductCreate>, ApiError>,
) -> Result<Envelope, ApiError> {
    ctx.require(Capability::ManageProducts)?;
    ctx.limit_user(&state)?;
    let ApiJson(mut body) = body?;
    body.validate()?;

    state
        .idempotency
        .run(ctx.fingerprint(&key), async {
            let mut product = Product::new(ctx.tenant_id, body.sku.as_str(), body.name.as_str(), body.price_in_pence);
            product.description.clone_from(&body.description);
            product.currency = body.currency.clone().unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
            product.is_active = body.is_active.unwrap_or(true);

            let product = ctx.db.create(&product)?;
            tracing::info!(tenant_id = %ctx.tenant_id, product_id = %product.id, sku = %product.sku, "Product created");
            audit::record(&ctx, audit::PRODUCT_CREATE, ENTITY, product.id, &json!({ "after": product }));
            Envelope::created(&product)
        })
        .await
}

/// `PATCH /api/admin/products/:id`
pub async fn update(
    State(state): State<Arc<AppState>>,
    ctx: AdminCtx,
    key: IdempotencyKey,
    Path(id): Path<String>,
    body: Result<ApiJson<ProductUpdate>, ApiError>,
) -> Result<Envelope, ApiError> {
    ctx.require(Capability::ManageProducts)?;
    ctx.limit_user(&state)?;
    let ApiJson(mut body) = body?;
    body.validate()?;

    state
        .idempotency
        .run(ctx.fingerprint(&key), async {
            let before = find(&ctx, &id)?;
            let after: Product = update_versioned(&ctx.db, before.id, body.expected_version, body.patch())?;
            tracing::info!(tenant_id = %ctx.tenant_id, product_id = %after.id, version = after.version, "Product updated");

            let diff = diff_for_update(&as_map(&before)?, &as_map(&after)?, &body.changed_fields());
            audit::record(&ctx, audit::PRODUCT_UPDATE, ENTITY, after.id, &diff);
            Envelope::ok(&after)
        })
        .await
}

/// `DELETE /api/admin/products/:id`
pub async fn delete(
    State(state): State<Arc<AppState>>,
    ctx: AdminCtx,
    key: IdempotencyKey,
    Path(id): Path<String>,
) -> Result<Envelope, ApiError> {
    ctx.require(Capability::ManageProducts)?;
    ctx.limit_user(&state)?;

    state
        .idempotency
        .run(ctx.fingerprint(&key), async {
            let product = find(&ctx, &id)?;
            let removed = ctx.db.delete_many::<Product>(Filter::eq("id", product.id))?;
            if removed == 0 {
                return Err(ApiError::not_found());
            }
            tracing::info!(tenant_id = %ctx.tenant_id, product_id = %product.id, "Product deleted");
            audit::record(&ctx, audit::PRODUCT_DELETE, ENTITY, product.id, &json!({ "before": product }));
            Envelope::ok(&json!({ "deleted": true }))
        })
        .await
}

fn find(ctx: &AdminCtx, id: &str) -> Result<Product, ApiError> {
    let id: ProductId = id.parse().map_err(|_| ApiError::not_found())?;
    ctx.db.find_first(Filter::eq("id", id))?.ok_or_else(ApiError::not_found)
}

fn as_map(product: &Product) -> Result<Map<String, Value>, ApiError> {
    match serde_json::to_value(product) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::Internal("product did not serialize to an object".into())),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}
