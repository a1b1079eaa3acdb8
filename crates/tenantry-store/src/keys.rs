//! Key encoding for table entries.
//!
//! Every table holds three kinds of entry, told apart by a one-letter tag:
//!
//! - `r/{id}`: the row itself.
//! - `t/{tenant_id}/{id}`: tenant index, so a tenant's rows can be iterated
//!   by prefix without touching other tenants.
//! - `u/{constraint}/{values}`: unique index, pointing a constraint tuple at
//!   the id that owns it. `values` is the JSON encoding of the tuple, so it
//!   matches exactly the rows an equality filter on those columns matches.
//!
//! Index entries store the owning row id as their value.

use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::schema::UniqueConstraint;

/// Prefix shared by every row key.
pub const ROW_PREFIX: &str = "r/";

/// Key of the row with `id`.
#[must_use]
pub fn row_key(id: &str) -> String {
    format!("{ROW_PREFIX}{id}")
}

/// True for row keys, false for index keys.
#[must_use]
pub fn is_row_key(key: &str) -> bool {
    key.starts_with(ROW_PREFIX)
}

/// Tenant index key.
///
/// Format: `t/{tenant_id}/{id}`. Keys for one tenant sort by row id.
#[must_use]
pub fn tenant_key(tenant_id: &str, id: &str) -> String {
    format!("{}{id}", tenant_prefix(tenant_id))
}

/// Prefix for iterating every row of one tenant.
#[must_use]
pub fn tenant_prefix(tenant_id: &str) -> String {
    format!("t/{tenant_id}/")
}

/// Unique index key for one constraint tuple.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if the tuple cannot be encoded.
pub fn unique_key(constraint: &UniqueConstraint, values: &[Value]) -> Result<String> {
    let encoded = serde_json::to_string(values).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(format!("u/{}/{encoded}", constraint.name))
}
