//! Tenants and the domains that map DNS hosts onto them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DomainId, TenantId};

/// Name of the cookie that remembers the last selected / host-resolved tenant.
pub const TENANT_COOKIE: &str = "tenant_id";

/// Lifetime of the tenant cookie in seconds (7 days).
pub const TENANT_COOKIE_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 7;

/// An isolated customer organization.
///
/// `slug` is the externally addressable handle (storefront URLs), `id` is the
/// internal scoping key stamped on every tenant-owned row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Internal scoping key.
    pub id: TenantId,

    /// Unique, URL-safe handle, stored lowercase.
    pub slug: String,

    /// Display name.
    pub name: String,

    /// When the tenant was created.
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a new tenant with a fresh id. The slug is lowercased.
    #[must_use]
    pub fn new(slug: &str, name: impl Into<String>) -> Self {
        Self {
            id: TenantId::generate(),
            slug: slug.to_ascii_lowercase(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Verification state of a domain mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainStatus {
    /// Ownership not yet proven. Resolves only outside production and only
    /// when the caller opts in.
    Pending,

    /// Ownership proven. Always resolves.
    Verified,
}

/// Maps one DNS host to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Domain id.
    pub id: DomainId,

    /// Normalized host, stored lowercase. Unique across all tenants.
    pub host: String,

    /// Owning tenant.
    pub tenant_id: TenantId,

    /// Whether this is the tenant's canonical host.
    pub is_primary: bool,

    /// Verification state.
    pub status: DomainStatus,

    /// When the mapping was created.
    pub created_at: DateTime<Utc>,
}

impl Domain {
    /// Create a new domain mapping. The host is lowercased.
    #[must_use]
    pub fn new(host: &str, tenant_id: TenantId, is_primary: bool, status: DomainStatus) -> Self {
        Self {
            id: DomainId::generate(),
            host: host.to_ascii_lowercase(),
            tenant_id,
            is_primary,
            status,
            created_at: Utc::now(),
        }
    }

    /// Whether this mapping may resolve a request.
    ///
    /// Verified domains always resolve; pending ones only when the caller
    /// allows it and the service is not running in production.
    #[must_use]
    pub fn resolves(&self, allow_pending: bool, production: bool) -> bool {
        match self.status {
            DomainStatus::Verified => true,
            DomainStatus::Pending => allow_pending && !production,
        }
    }
}
