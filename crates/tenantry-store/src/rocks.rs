//! `RocksDB` storage implementation.
//!
//! One column family per [`Table`]. Rows are CBOR-encoded under `r/{id}`;
//! tenant and unique index entries hold the owning row id (see
//! [`crate::keys`]). Point reads go through `get_cf`, tenant reads through
//! `prefix_iterator_cf`. A writer mutex serializes [`Store::execute`] so the
//! read-check-write sequence of a unique insert or conditional update cannot
//! interleave with another; each change set lands in a single `WriteBatch`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options, WriteBatch};

use crate::engine::{self, Backend, Change, Entry};
use crate::error::{Result, StoreError};
use crate::keys;
use crate::query::{Operation, Outcome, Row};
use crate::schema::{all_column_families, Table};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    writer: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(tables = Table::ALL.len(), "RocksDB store opened");
        Ok(Self { db: Arc::new(db), writer: Mutex::new(()) })
    }

    /// Get a column family handle.
    fn cf(&self, table: Table) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(table.name())
            .ok_or_else(|| StoreError::Database(format!("column family not found: {table}")))
    }

    /// Encode an entry: rows as CBOR, index entries as the bare id.
    fn encode(entry: &Entry) -> Result<Vec<u8>> {
        match entry {
            Entry::Row(row) => {
                let mut buf = Vec::new();
                ciborium::into_writer(row, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(buf)
            }
            Entry::Id(id) => Ok(id.as_bytes().to_vec()),
        }
    }

    /// Decode the entry stored at `key`.
    fn decode(key: &str, data: &[u8]) -> Result<Entry> {
        if keys::is_row_key(key) {
            let row: Row = ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))?;
            Ok(Entry::Row(row))
        } else {
            String::from_utf8(data.to_vec())
                .map(Entry::Id)
                .map_err(|e| StoreError::Serialization(e.to_string()))
        }
    }
}

struct Batch<'a>(&'a RocksStore);

impl Backend for Batch<'_> {
    fn get(&self, table: Table, key: &str) -> Result<Option<Entry>> {
        let cf = self.0.cf(table)?;
        self.0
            .db
            .get_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| RocksStore::decode(key, &data))
            .transpose()
    }

    fn scan_prefix(&self, table: Table, prefix: &str) -> Result<Vec<(String, Entry)>> {
        let cf = self.0.cf(table)?;
        let mut entries = Vec::new();
        for item in self.0.db.prefix_iterator_cf(&cf, prefix.as_bytes()) {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            // No prefix extractor is configured, so the iterator runs past the range.
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key.into_vec()).map_err(|e| StoreError::Serialization(e.to_string()))?;
            let entry = RocksStore::decode(&key, &value)?;
            entries.push((key, entry));
        }
        Ok(entries)
    }

    fn commit(&mut self, changes: Vec<Change>) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for change in changes {
            match change {
                Change::Put { table, key, entry } => {
                    let cf = self.0.cf(table)?;
                    batch.put_cf(&cf, key.as_bytes(), RocksStore::encode(&entry)?);
                }
                Change::Delete { table, key } => {
                    let cf = self.0.cf(table)?;
                    batch.delete_cf(&cf, key.as_bytes());
                }
            }
        }
        self.0.db.write(batch).map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl Store for RocksStore {
    fn execute(&self, op: Operation) -> Result<Outcome> {
        let _writer = self
            .writer
            .lock()
            .map_err(|_| StoreError::Database("rocksdb writer lock poisoned".into()))?;
        engine::execute(&mut Batch(self), op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, Page, Patch, Read, UniqueKey, Write};
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn row(v: serde_json::Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            store
                .execute(Operation::CreateOne {
                    table: Table::Tenants,
                    data: row(json!({"slug": "acme", "name": "Acme"})),
                })
                .unwrap();
        }
        let store = RocksStore::open(dir.path()).unwrap();
        let found = store
            .execute(Operation::ReadMany {
                table: Table::Tenants,
                filter: Filter::eq("slug", "acme"),
                read: Read::First(None),
            })
            .unwrap()
            .into_row()
            .unwrap()
            .unwrap();
        assert_eq!(found["name"], "Acme");
    }

    #[test]
    fn unique_constraint_is_enforced() {
        let (store, _dir) = create_test_store();
        let data = row(json!({"tenant_id": "t1", "sku": "A", "name": "x", "price_in_pence": 1}));
        store.execute(Operation::CreateOne { table: Table::Products, data: data.clone() }).unwrap();
        let err = store.execute(Operation::CreateOne { table: Table::Products, data }).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { constraint, .. } if constraint == "products_tenant_id_sku_key"));
    }

    #[test]
    fn conditional_update_and_delete() {
        let (store, _dir) = create_test_store();
        let created = store
            .execute(Operation::CreateOne {
                table: Table::Products,
                data: row(json!({"tenant_id": "t1", "sku": "A", "name": "x", "price_in_pence": 1})),
            })
            .unwrap()
            .into_row()
            .unwrap()
            .unwrap();
        assert_eq!(created["version"], 1);

        let id = created["id"].clone();
        let matched = store
            .execute(Operation::WriteMany {
                table: Table::Products,
                filter: Filter::eq("id", id.clone()).and(Filter::eq("version", 1)),
                write: Write::Update(Patch::new().set("name", "y").increment("version", 1)),
            })
            .unwrap()
            .into_count()
            .unwrap();
        assert_eq!(matched, 1);

        let stale = store
            .execute(Operation::WriteMany {
                table: Table::Products,
                filter: Filter::eq("id", id.clone()).and(Filter::eq("version", 1)),
                write: Write::Update(Patch::new().set("name", "z").increment("version", 1)),
            })
            .unwrap()
            .into_count()
            .unwrap();
        assert_eq!(stale, 0);

        let removed = store
            .execute(Operation::WriteMany { table: Table::Products, filter: Filter::eq("id", id), write: Write::Delete })
            .unwrap()
            .into_count()
            .unwrap();
        assert_eq!(removed, 1);

        let left = store
            .execute(Operation::ReadMany { table: Table::Products, filter: Filter::All, read: Read::List(Page::default()) })
            .unwrap()
            .into_rows()
            .unwrap();
        assert!(left.is_empty());
    }

    #[test]
    fn upsert_inserts_then_updates() {
        let (store, _dir) = create_test_store();
        let key = UniqueKey::new().field("slug", "acme");
        let first = store
            .execute(Operation::Upsert {
                table: Table::Tenants,
                key: key.clone(),
                create: row(json!({"name": "Acme"})),
                update: Patch::new(),
            })
            .unwrap()
            .into_row()
            .unwrap()
            .unwrap();
        let second = store
            .execute(Operation::Upsert {
                table: Table::Tenants,
                key,
                create: row(json!({"name": "Other"})),
                update: Patch::new().set("name", "Acme Ltd"),
            })
            .unwrap()
            .into_row()
            .unwrap()
            .unwrap();
        assert_eq!(first["id"], second["id"]);
        assert_eq!(second["name"], "Acme Ltd");
        assert_eq!(second["slug"], "acme");
    }

    #[test]
    fn tenant_reads_stop_at_the_prefix() {
        let (store, _dir) = create_test_store();
        for (tenant, sku) in [("t1", "A"), ("t1", "B"), ("t10", "A"), ("t2", "A")] {
            store
                .execute(Operation::CreateOne {
                    table: Table::Products,
                    data: row(json!({"tenant_id": tenant, "sku": sku, "name": sku, "price_in_pence": 1})),
                })
                .unwrap();
        }

        let rows = store
            .execute(Operation::ReadMany {
                table: Table::Products,
                filter: Filter::eq("tenant_id", "t1"),
                read: Read::List(Page::default()),
            })
            .unwrap()
            .into_rows()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["tenant_id"] == "t1"));
    }

    #[test]
    fn renamed_unique_value_is_released() {
        let (store, _dir) = create_test_store();
        let tenant = store
            .execute(Operation::CreateOne { table: Table::Tenants, data: row(json!({"slug": "acme", "name": "Acme"})) })
            .unwrap()
            .into_row()
            .unwrap()
            .unwrap();

        store
            .execute(Operation::SingleRow {
                table: Table::Tenants,
                id: tenant["id"].clone(),
                action: crate::query::SingleRowAction::Update(Patch::new().set("slug", "acme-ltd")),
            })
            .unwrap();

        let by_old = store
            .execute(Operation::ReadMany { table: Table::Tenants, filter: Filter::eq("slug", "acme"), read: Read::Count })
            .unwrap()
            .into_count()
            .unwrap();
        assert_eq!(by_old, 0);
        store
            .execute(Operation::CreateOne { table: Table::Tenants, data: row(json!({"slug": "acme", "name": "New Acme"})) })
            .unwrap();
    }
}
