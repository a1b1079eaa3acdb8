//! Tenant catalog products.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ProductId, TenantId};

/// The only currency the catalog accepts.
pub const DEFAULT_CURRENCY: &str = "GBP";

/// A catalog product. Tenant scoped and versioned; unique on
/// `(tenant_id, sku)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product id.
    pub id: ProductId,

    /// Owning tenant.
    pub tenant_id: TenantId,

    /// Stock keeping unit, unique within the tenant.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Optional long description.
    pub description: Option<String>,

    /// Price in pence.
    pub price_in_pence: i64,

    /// ISO currency code.
    pub currency: String,

    /// Inactive products are hidden from the storefront.
    pub is_active: bool,

    /// OCC version, starts at 1.
    pub version: i64,

    /// When the product was created.
    pub created_at: DateTime<Utc>,

    /// When the product was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Create an active GBP product with a fresh id.
    #[must_use]
    pub fn new(tenant_id: TenantId, sku: impl Into<String>, name: impl Into<String>, price_in_pence: i64) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::generate(),
            tenant_id,
            sku: sku.into(),
            name: name.into(),
            description: None,
            price_in_pence,
            currency: DEFAULT_CURRENCY.to_string(),
            is_active: true,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style description setter.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Storefront projection of a [`Product`]. Carries no internal ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProduct {
    /// SKU.
    pub sku: String,
    /// Name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Price in pence.
    pub price_in_pence: i64,
    /// Currency.
    pub currency: String,
    /// Always true on the storefront.
    pub is_active: bool,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for PublicProduct {
    fn from(p: Product) -> Self {
        Self {
            sku: p.sku,
            name: p.name,
            description: p.description,
            price_in_pence: p.price_in_pence,
            currency: p.currency,
            is_active: p.is_active,
            updated_at: p.updated_at,
        }
    }
}
