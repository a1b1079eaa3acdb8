//! In-memory storage implementation.
//!
//! Backs tests and development runs. One mutex guards every table, so each
//! [`Store::execute`] call is atomic with respect to all others. Entries are
//! held in ordered maps so prefix walks cost the size of the prefix range,
//! not the table.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Mutex;

use crate::engine::{self, Backend, Change, Entry};
use crate::error::{Result, StoreError};
use crate::query::{Operation, Outcome};
use crate::schema::Table;
use crate::Store;

type Tables = HashMap<Table, BTreeMap<String, Entry>>;

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

struct Locked<'a>(&'a mut Tables);

impl Backend for Locked<'_> {
    fn get(&self, table: Table, key: &str) -> Result<Option<Entry>> {
        Ok(self.0.get(&table).and_then(|t| t.get(key)).cloned())
    }

    fn scan_prefix(&self, table: Table, prefix: &str) -> Result<Vec<(String, Entry)>> {
        let Some(entries) = self.0.get(&table) else { return Ok(Vec::new()) };
        Ok(entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect())
    }

    fn commit(&mut self, changes: Vec<Change>) -> Result<()> {
        for change in changes {
            match change {
                Change::Put { table, key, entry } => {
                    self.0.entry(table).or_default().insert(key, entry);
                }
                Change::Delete { table, key } => {
                    if let Some(t) = self.0.get_mut(&table) {
                        t.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn execute(&self, op: Operation) -> Result<Outcome> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))?;
        engine::execute(&mut Locked(&mut tables), op)
    }
}
