//! Optimistic concurrency control for versioned records.

use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::guard::DataAccess;
use crate::query::{Filter, Patch};
use crate::record::Record;

/// Apply `patch` to the record `id` only if its stored version still equals
/// `expected_version`, bumping the version by exactly one.
///
/// The check and the write are one conditional update
/// (`WHERE id = ? AND version = ?`); nothing is read first. When no row
/// matches, a follow-up read tells a missing row from a stale version.
///
/// # Errors
///
/// - `StoreError::NotFound` if no row with `id` is visible through `db`.
/// - `StoreError::VersionConflict` with the stored version if it moved on.
/// - `StoreError::InvalidQuery` for unversioned tables or patches that set
///   `version` themselves.
pub fn update_versioned<R, D>(db: &D, id: impl Into<Value>, expected_version: i64, patch: Patch) -> Result<R>
where
    R: Record,
    D: DataAccess,
{
    let table = R::TABLE;
    if !table.is_versioned() {
        return Err(StoreError::InvalidQuery(format!("{table} is not versioned")));
    }
    if patch.touches("version") {
        return Err(StoreError::InvalidQuery("version is managed by update_versioned".into()));
    }

    let id = id.into();
    let by_id = Filter::Eq("id".into(), id.clone());
    let predicate = by_id.clone().and(Filter::eq("version", expected_version));

    let affected = db.update_many::<R>(predicate, patch.increment("version", 1))?;
    if affected > 0 {
        return db.find_first::<R>(by_id)?.ok_or_else(|| not_found(table.name(), &id));
    }

    match db.first_row(table, by_id)? {
        None => Err(not_found(table.name(), &id)),
        Some(row) => {
            let current = row.get("version").and_then(Value::as_i64).unwrap_or_default();
            tracing::debug!(table = table.name(), %id, expected_version, current, "Version conflict");
            Err(StoreError::VersionConflict {
                table: table.name(),
                id: display_id(&id),
                expected: expected_version,
                current,
            })
        }
    }
}

fn not_found(table: &'static str, id: &Value) -> StoreError {
    StoreError::NotFound { table, id: display_id(id) }
}

fn display_id(id: &Value) -> String {
    id.as_str().map_or_else(|| id.to_string(), str::to_string)
}
