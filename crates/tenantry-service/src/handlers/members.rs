//! Tenant membership administration.
//!
//! Two rules on top of the `can_manage_members` capability:
//! only owners may grant, revoke or remove ownership, and the last owner of
//! a tenant can be neither demoted nor removed.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use tenantry_core::{Capability, Membership, MembershipId, TenantId, User, UserId};
use tenantry_store::{update_versioned, DataAccess, Filter, OrderBy, Page};

use super::{ListQuery, Paged};
use crate::audit;
use crate::error::ApiError;
use crate::extract::{AdminCtx, ApiJson, IdempotencyKey};
use crate::response::Envelope;
use crate::state::AppState;
use crate::validation::{MemberCaps, MemberCreate, MemberUpdate};

const DEFAULT_LIMIT: usize = 25;
const MAX_LIMIT: usize = 100;
const ENTITY: &str = "Membership";

/// A membership joined with its user's email.
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    /// Membership id.
    pub id: MembershipId,
    /// Tenant.
    pub tenant_id: TenantId,
    /// Member user.
    pub user_id: UserId,
    /// Member email, when the user still exists.
    pub email: Option<String>,
    /// Owner flag.
    pub is_owner: bool,
    /// Member administration.
    pub can_manage_members: bool,
    /// Product writes.
    pub can_manage_products: bool,
    /// Product reads.
    pub can_view_products: bool,
    /// OCC version.
    pub version: i64,
    /// Created.
    pub created_at: DateTime<Utc>,
    /// Last changed.
    pub updated_at: DateTime<Utc>,
}

impl MemberView {
    fn new(m: Membership, email: Option<String>) -> Self {
        Self {
            id: m.id,
            tenant_id: m.tenant_id,
            user_id: m.user_id,
            email,
            is_owner: m.is_owner,
            can_manage_members: m.can_manage_members,
            can_manage_products: m.can_manage_products,
            can_view_products: m.can_view_products,
            version: m.version,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// `GET /api/admin/members`
pub async fn list(
    State(state): State<Arc<AppState>>,
    ctx: AdminCtx,
    Query(query): Query<ListQuery>,
) -> Result<Envelope, ApiError> {
    ctx.require(Capability::ManageMembers)?;

    let limit = query.limit(DEFAULT_LIMIT, MAX_LIMIT);
    let offset = query.offset();
    let members: Vec<Membership> = ctx.db.find_many(
        Filter::All,
        Page::ordered(OrderBy::asc("created_at")).limit(limit).offset(offset),
    )?;

    let emails: Vec<User> = if members.is_empty() {
        Vec::new()
    } else {
        state.system_db().find_many(
            Filter::Or(members.iter().map(|m| Filter::eq("id", m.user_id)).collect()),
            Page::default(),
        )?
    };
    let email_of = |id: UserId| emails.iter().find(|u| u.id == id).map(|u| u.email.clone());

    let views: Vec<MemberView> = members
        .into_iter()
        .map(|m| {
            let email = email_of(m.user_id);
            MemberView::new(m, email)
        })
        .collect();
    Envelope::ok(&Paged::new(views, limit, offset))
}

/// `GET /api/admin/members/:id`
pub async fn get(
    State(state): State<Arc<AppState>>,
    ctx: AdminCtx,
    Path(id): Path<String>,
) -> Result<Envelope, ApiError> {
    ctx.require(Capability::ManageMembers)?;
    let member = find(&ctx, &id)?;
    Envelope::ok(&view(&state, member)?)
}

/// `POST /api/admin/members` - attach an existing user by email.
pub async fn create(
    State(state): State<Arc<AppState>>,
    ctx: AdminCtx,
    key: IdempotencyKey,
    body: Result<ApiJson<MemberCreate>, ApiError>,
) -> Result<Envelope, ApiError> {
    ctx.require(Capability::ManageMembers)?;
    ctx.limit_user(&state)?;
    let ApiJson(mut body) = body?;
    body.validate()?;
    require_owner_for(&ctx, &body.caps)?;

    state
        .idempotency
        .run(ctx.fingerprint(&key), async {
            let user: User = state
                .system_db()
                .find_first(Filter::eq("email", body.email.as_str()))?
                .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

            let member = with_caps(Membership::new(ctx.tenant_id, user.id), &body.caps);
            let member = ctx.db.create(&member)?;
            tracing::info!(tenant_id = %ctx.tenant_id, user_id = %user.id, membership_id = %member.id, "Member added");
            audit::record(&ctx, audit::MEMBERSHIP_CREATE, ENTITY, member.id, &json!({ "after": member }));
            Envelope::created(&MemberView::new(member, Some(user.email)))
        })
        .await
}

/// `PATCH /api/admin/members/:id` - change capabilities under OCC.
pub async fn update(
    State(state): State<Arc<AppState>>,
    ctx: AdminCtx,
    key: IdempotencyKey,
    Path(id): Path<String>,
    body: Result<ApiJson<MemberUpdate>, ApiError>,
) -> Result<Envelope, ApiError> {
    ctx.require(Capability::ManageMembers)?;
    ctx.limit_user(&state)?;
    let ApiJson(body) = body?;
    body.validate()?;
    require_owner_for(&ctx, &body.caps)?;

    state
        .idempotency
        .run(ctx.fingerprint(&key), async {
            let before = find(&ctx, &id)?;
            if before.is_owner && body.caps.is_owner == Some(false) {
                ensure_not_last_owner(&ctx)?;
            }

            let after: Membership = update_versioned(&ctx.db, before.id, body.expected_version, body.caps.patch())?;
            tracing::info!(tenant_id = %ctx.tenant_id, membership_id = %after.id, version = after.version, "Member updated");

            let diff = json!({
                "before": caps_of(&before, &body.caps),
                "after": caps_of(&after, &body.caps),
            });
            audit::record(&ctx, audit::MEMBERSHIP_UPDATE, ENTITY, after.id, &diff);
            Envelope::ok(&view(&state, after)?)
        })
        .await
}

/// `DELETE /api/admin/members/:id`
pub async fn delete(
    State(state): State<Arc<AppState>>,
    ctx: AdminCtx,
    key: IdempotencyKey,
    Path(id): Path<String>,
) -> Result<Envelope, ApiError> {
    ctx.require(Capability::ManageMembers)?;
    ctx.limit_user(&state)?;

    state
        .idempotency
        .run(ctx.fingerprint(&key), async {
            let member = find(&ctx, &id)?;
            if member.is_owner {
                if !ctx.membership.is_owner {
                    return Err(owner_only());
                }
                ensure_not_last_owner(&ctx)?;
            }

            let removed = ctx.db.delete_many::<Membership>(Filter::eq("id", member.id))?;
            if removed == 0 {
                return Err(ApiError::not_found());
            }
            tracing::info!(tenant_id = %ctx.tenant_id, membership_id = %member.id, "Member removed");
            audit::record(&ctx, audit::MEMBERSHIP_DELETE, ENTITY, member.id, &json!({ "before": member }));
            Envelope::ok(&json!({ "deleted": true }))
        })
        .await
}

fn find(ctx: &AdminCtx, id: &str) -> Result<Membership, ApiError> {
    let id: MembershipId = id.parse().map_err(|_| ApiError::not_found())?;
    ctx.db.find_first(Filter::eq("id", id))?.ok_or_else(ApiError::not_found)
}

fn view(state: &AppState, member: Membership) -> Result<MemberView, ApiError> {
    let user: Option<User> = state.system_db().find_first(Filter::eq("id", member.user_id))?;
    Ok(MemberView::new(member, user.map(|u| u.email)))
}

fn owner_only() -> ApiError {
    ApiError::Forbidden("Only owners can modify is_owner".into())
}

fn require_owner_for(ctx: &AdminCtx, caps: &MemberCaps) -> Result<(), ApiError> {
    if caps.is_owner.is_some() && !ctx.membership.is_owner {
        return Err(owner_only());
    }
    Ok(())
}

fn ensure_not_last_owner(ctx: &AdminCtx) -> Result<(), ApiError> {
    let owners = ctx.db.count::<Membership>(Filter::eq("is_owner", true))?;
    if owners <= 1 {
        tracing::warn!(tenant_id = %ctx.tenant_id, "Refused to remove the last owner");
        return Err(ApiError::Conflict("Cannot remove the last owner".into()));
    }
    Ok(())
}

fn with_caps(mut member: Membership, caps: &MemberCaps) -> Membership {
    if let Some(v) = caps.is_owner {
        member.is_owner = v;
    }
    if let Some(v) = caps.can_manage_members {
        member.can_manage_members = v;
    }
    if let Some(v) = caps.can_manage_products {
        member.can_manage_products = v;
    }
    if let Some(v) = caps.can_view_products {
        member.can_view_products = v;
    }
    member
}

/// The flags named in `changed`, as stored on `m`.
fn caps_of(m: &Membership, changed: &MemberCaps) -> Value {
    let mut out = serde_json::Map::new();
    for (field, present, value) in [
        ("is_owner", changed.is_owner.is_some(), m.is_owner),
        ("can_manage_members", changed.can_manage_members.is_some(), m.can_manage_members),
        ("can_manage_products", changed.can_manage_products.is_some(), m.can_manage_products),
        ("can_view_products", changed.can_view_products.is_some(), m.can_view_products),
    ] {
        if present {
            out.insert(field.into(), Value::Bool(value));
        }
    }
    Value::Object(out)
}
