//! Error types for tenantry storage.

use std::fmt;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
///
/// Guard, not-found, version and uniqueness conditions are kept as distinct
/// variants all the way up to the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{table} not found: {id}")]
    NotFound {
        /// Table name.
        table: &'static str,
        /// Requested id.
        id: String,
    },

    /// Optimistic concurrency check failed.
    #[error("version conflict on {table} {id}: expected={expected}, current={current}")]
    VersionConflict {
        /// Table name.
        table: &'static str,
        /// Row id.
        id: String,
        /// Version the caller presented.
        expected: i64,
        /// Version currently stored.
        current: i64,
    },

    /// A unique constraint would be violated.
    #[error("unique constraint {constraint} violated on {table}")]
    UniqueViolation {
        /// Table name.
        table: &'static str,
        /// Constraint name.
        constraint: String,
    },

    /// The tenant guard rejected the operation.
    #[error(transparent)]
    GuardViolation(#[from] GuardViolation),

    /// The operation is malformed (bad upsert key, unexpected outcome shape).
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A data access attempt that would break tenant isolation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tenant guard: {reason} on {table}")]
pub struct GuardViolation {
    /// Table the operation targeted.
    pub table: &'static str,
    /// Why it was rejected.
    pub reason: GuardReason,
}

impl GuardViolation {
    /// Build a violation.
    #[must_use]
    pub const fn new(table: &'static str, reason: GuardReason) -> Self {
        Self { table, reason }
    }
}

/// Why the guard rejected an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardReason {
    /// Fetch / update / delete addressed by bare id.
    BannedPrimitive(&'static str),
    /// Payload names a tenant other than the bound one.
    TenantMismatch,
    /// Payload names the tenant both as `tenant_id` and as a `tenant` relation.
    AmbiguousTenant,
    /// Upsert lookup key does not include the bound tenant id.
    UpsertKeyNotTenantScoped,
    /// Update tries to move a row to another tenant.
    TenantImmutable,
    /// Tenant-owned table used through an unscoped handle.
    UnscopedAccess,
}

impl fmt::Display for GuardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BannedPrimitive(op) => {
                write!(f, "{op} by bare id is disallowed, use a tenant-filtered many-row operation")
            }
            Self::TenantMismatch => f.write_str("data tenant does not match context"),
            Self::AmbiguousTenant => f.write_str("provide either tenant_id or tenant relation, not both"),
            Self::UpsertKeyNotTenantScoped => {
                f.write_str("upsert must use a composite unique key that includes tenant_id")
            }
            Self::TenantImmutable => f.write_str("tenant ownership cannot be changed"),
            Self::UnscopedAccess => f.write_str("tenant-scoped table requires a tenant-bound handle"),
        }
    }
}
