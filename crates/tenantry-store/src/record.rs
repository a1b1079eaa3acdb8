//! Typed records stored as rows.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use tenantry_core::{AuditLog, Domain, IdempotencyRecord, Membership, Product, Tenant, User};

use crate::error::{Result, StoreError};
use crate::query::Row;
use crate::schema::Table;

/// A record type bound to the table it lives in.
pub trait Record: Serialize + DeserializeOwned {
    /// Backing table.
    const TABLE: Table;
}

impl Record for Tenant {
    const TABLE: Table = Table::Tenants;
}

impl Record for Domain {
    const TABLE: Table = Table::Domains;
}

impl Record for User {
    const TABLE: Table = Table::Users;
}

impl Record for Product {
    const TABLE: Table = Table::Products;
}

impl Record for Membership {
    const TABLE: Table = Table::Memberships;
}

impl Record for AuditLog {
    const TABLE: Table = Table::AuditLogs;
}

impl Record for IdempotencyRecord {
    const TABLE: Table = Table::IdempotencyRecords;
}

/// Serialize a record into a row.
pub fn to_row<R: Record>(record: &R) -> Result<Row> {
    match serde_json::to_value(record)? {
        Value::Object(row) => Ok(row),
        other => Err(StoreError::Serialization(format!(
            "{} record serialized to non-object {other}",
            R::TABLE
        ))),
    }
}

/// Deserialize a row into a record.
pub fn from_row<R: Record>(row: Row) -> Result<R> {
    Ok(serde_json::from_value(Value::Object(row))?)
}
