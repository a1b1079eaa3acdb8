//! Request and response types for the tenantry client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tenantry_core::{MembershipId, PublicProduct, TenantId, UserId};

pub use tenantry_core::Product;

/// Success envelope: `{ "ok": true, "data": ... }`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

/// Error envelope: `{ "ok": false, "error": ..., "code": ..., ... }`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default)]
    pub issues: Option<serde_json::Value>,
    #[serde(default)]
    pub expected_version: Option<i64>,
    #[serde(default)]
    pub current_version: Option<i64>,
}

/// One page of an admin listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    /// Rows on this page.
    pub items: Vec<T>,
    /// Offset of the next page, when this one was full.
    pub next_offset: Option<usize>,
}

/// Listing parameters shared by admin and storefront lists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListParams {
    /// Case-insensitive search text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    /// Page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Rows to skip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

/// Result of the public ping.
#[derive(Debug, Clone, Deserialize)]
pub struct Ping {
    /// Tenant bound to the request.
    pub tenant_id: TenantId,
    /// How it was resolved (`host`, `cookie`, `header`, `query`).
    pub source: String,
}

/// New product.
#[derive(Debug, Clone, Serialize)]
pub struct NewProduct {
    /// SKU, unique per tenant.
    pub sku: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Price in pence.
    pub price_in_pence: i64,
    /// Defaults to active server side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Partial product update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProductChanges {
    /// New SKU.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_in_pence: Option<i64>,
    /// New active flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Capability flags. Absent flags keep their current value.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Caps {
    /// Ownership. Only owners may change it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_owner: Option<bool>,
    /// Member administration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_manage_members: Option<bool>,
    /// Product writes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_manage_products: Option<bool>,
    /// Product reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_view_products: Option<bool>,
}

/// A tenant member as returned by the admin API.
#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    /// Membership id.
    pub id: MembershipId,
    /// Tenant.
    pub tenant_id: TenantId,
    /// Member user.
    pub user_id: UserId,
    /// Member email.
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

/// Public tenant identity on storefront responses.
#[derive(Debug, Clone, Deserialize)]
pub struct StorefrontTenant {
    /// URL slug.
    pub slug: String,
    /// Display name.
    pub name: String,
}

/// A storefront listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    /// The tenant.
    pub tenant: StorefrontTenant,
    /// Active products.
    pub products: Vec<PublicProduct>,
    /// Offset of the next page.
    pub next_offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AddMember<'a> {
    pub email: &'a str,
    pub caps: Caps,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Versioned<T> {
    pub expected_version: i64,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CapsUpdate {
    pub expected_version: i64,
    pub caps: Caps,
}
