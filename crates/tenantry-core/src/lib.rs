//! Core types and utilities for tenantry.
//!
//! This crate provides the foundational, I/O-free types shared by the store,
//! the HTTP service and the client SDK:
//!
//! - **Identifiers**: `TenantId`, `UserId`, `ProductId`, `MembershipId`, `AuditLogId`, ...
//! - **Tenancy**: `Tenant`, `Domain`, `DomainStatus`
//! - **Actors**: `User`, `Membership`, `Capability`
//! - **Catalog**: `Product`, `PublicProduct`
//! - **Audit**: `AuditLog` plus shallow redaction helpers
//! - **Idempotency**: `IdempotencyRecord`, `Fingerprint`
//! - **Hosts**: `normalize_host`
//!
//! # Tenant scoping
//!
//! Every tenant-owned record carries a non-null `tenant_id` that never changes
//! after creation. Versioned records start at `version = 1`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod host;
pub mod idempotency;
pub mod ids;
pub mod product;
pub mod tenant;
pub mod user;

pub use audit::{diff_for_update, redact_diff, redact_once, AuditLog};
pub use host::normalize_host;
pub use idempotency::{Fingerprint, IdempotencyRecord, MAX_IDEMPOTENCY_KEY_LEN};
pub use ids::{
    AuditLogId, DomainId, IdError, IdempotencyRecordId, MembershipId, ProductId, TenantId, UserId,
};
pub use product::{Product, PublicProduct, DEFAULT_CURRENCY};
pub use tenant::{Domain, DomainStatus, Tenant, TENANT_COOKIE, TENANT_COOKIE_MAX_AGE_SECS};
pub use user::{Capability, Membership, User};
