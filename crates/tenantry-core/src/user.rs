//! Users (actors) and their per-tenant memberships.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MembershipId, TenantId, UserId};

/// An authenticated actor. Users are global; what they can do inside a tenant
/// is decided by their [`Membership`] there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id (the JWT `sub`).
    pub id: UserId,

    /// Unique email address, stored lowercase.
    pub email: String,

    /// Optional display name.
    pub name: Option<String>,

    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with a fresh id.
    #[must_use]
    pub fn new(email: &str, name: Option<String>) -> Self {
        Self {
            id: UserId::generate(),
            email: email.trim().to_ascii_lowercase(),
            name,
            created_at: Utc::now(),
        }
    }
}

/// A user's capabilities within one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Membership id.
    pub id: MembershipId,

    /// Owning tenant.
    pub tenant_id: TenantId,

    /// Member.
    pub user_id: UserId,

    /// Owners may grant or revoke ownership. A tenant always keeps one.
    pub is_owner: bool,

    /// May add, edit and remove members.
    pub can_manage_members: bool,

    /// May create, edit and delete products.
    pub can_manage_products: bool,

    /// May list and read products.
    pub can_view_products: bool,

    /// OCC version, starts at 1.
    pub version: i64,

    /// When the membership was created.
    pub created_at: DateTime<Utc>,

    /// When the membership was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    /// Create a plain read-only membership.
    #[must_use]
    pub fn new(tenant_id: TenantId, user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: MembershipId::generate(),
            tenant_id,
            user_id,
            is_owner: false,
            can_manage_members: false,
            can_manage_products: false,
            can_view_products: true,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an owner membership with every capability.
    #[must_use]
    pub fn owner(tenant_id: TenantId, user_id: UserId) -> Self {
        Self {
            is_owner: true,
            can_manage_members: true,
            can_manage_products: true,
            ..Self::new(tenant_id, user_id)
        }
    }

    /// Check a capability. Owners hold every capability.
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.is_owner
            || match capability {
                Capability::ManageMembers => self.can_manage_members,
                Capability::ManageProducts => self.can_manage_products,
                Capability::ViewProducts => self.can_view_products || self.can_manage_products,
            }
    }
}

/// Capabilities checked by the admin handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Member administration.
    ManageMembers,
    /// Product writes.
    ManageProducts,
    /// Product reads.
    ViewProducts,
}
