//! Backend-agnostic operation executor.
//!
//! Backends only store keyed entries (see [`crate::keys`]) and commit a
//! change set atomically. Everything else lives here so both backends behave
//! identically: picking the narrowest entries a filter can match, filtering,
//! ordering, defaults, and keeping the tenant and unique indexes in step
//! with the rows. Callers hold the backend's writer lock for the whole of
//! [`execute`], which makes each operation a single atomic statement.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::keys;
use crate::query::{Aggregate, Filter, Operation, OrderBy, Outcome, Page, Patch, Read, Row, SingleRowAction, UniqueKey, Write};
use crate::schema::Table;

/// A stored entry: a row, or an index entry naming the id of its row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Entry {
    Row(Row),
    Id(String),
}

/// One entry-level mutation in a change set.
#[derive(Debug, Clone)]
pub(crate) enum Change {
    Put { table: Table, key: String, entry: Entry },
    Delete { table: Table, key: String },
}

/// Minimal storage contract the executor runs against.
pub(crate) trait Backend {
    /// Entry stored at `key`.
    fn get(&self, table: Table, key: &str) -> Result<Option<Entry>>;

    /// Entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, table: Table, prefix: &str) -> Result<Vec<(String, Entry)>>;

    /// Apply every change or none.
    fn commit(&mut self, changes: Vec<Change>) -> Result<()>;
}

/// Uncommitted changes layered over a backend. Reads see the writes made
/// earlier in the same operation.
struct Txn<'a, B> {
    backend: &'a mut B,
    pending: BTreeMap<(Table, String), Option<Entry>>,
}

impl<'a, B: Backend> Txn<'a, B> {
    fn new(backend: &'a mut B) -> Self {
        Self { backend, pending: BTreeMap::new() }
    }

    fn get(&self, table: Table, key: &str) -> Result<Option<Entry>> {
        match self.pending.get(&(table, key.to_string())) {
            Some(entry) => Ok(entry.clone()),
            None => self.backend.get(table, key),
        }
    }

    fn scan_prefix(&self, table: Table, prefix: &str) -> Result<Vec<(String, Entry)>> {
        let mut merged: BTreeMap<String, Entry> = self.backend.scan_prefix(table, prefix)?.into_iter().collect();
        for ((t, key), entry) in &self.pending {
            if *t != table || !key.starts_with(prefix) {
                continue;
            }
            match entry {
                Some(entry) => {
                    merged.insert(key.clone(), entry.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    fn row(&self, table: Table, id: &str) -> Result<Option<Row>> {
        let key = keys::row_key(id);
        match self.get(table, &key)? {
            None => Ok(None),
            Some(Entry::Row(row)) => Ok(Some(row)),
            Some(Entry::Id(_)) => Err(misplaced(table, &key)),
        }
    }

    /// Id of the row an index entry points at.
    fn owner(&self, table: Table, key: &str) -> Result<Option<String>> {
        match self.get(table, key)? {
            None => Ok(None),
            Some(Entry::Id(id)) => Ok(Some(id)),
            Some(Entry::Row(_)) => Err(misplaced(table, key)),
        }
    }

    /// Write `row` over `old`, moving its index entries along with it.
    fn put_row(&mut self, table: Table, old: Option<&Row>, row: Row) -> Result<()> {
        let id = row_id(table, &row)?;
        let fresh = index_keys(table, &row)?;
        if let Some(old) = old {
            for stale in index_keys(table, old)?.difference(&fresh) {
                self.pending.insert((table, stale.clone()), None);
            }
        }
        for key in fresh {
            self.pending.insert((table, key), Some(Entry::Id(id.clone())));
        }
        self.pending.insert((table, keys::row_key(&id)), Some(Entry::Row(row)));
        Ok(())
    }

    fn delete_row(&mut self, table: Table, row: &Row) -> Result<()> {
        let id = row_id(table, row)?;
        for key in index_keys(table, row)? {
            self.pending.insert((table, key), None);
        }
        self.pending.insert((table, keys::row_key(&id)), None);
        Ok(())
    }

    fn commit(self) -> Result<()> {
        let changes = self
            .pending
            .into_iter()
            .map(|((table, key), entry)| match entry {
                Some(entry) => Change::Put { table, key, entry },
                None => Change::Delete { table, key },
            })
            .collect();
        self.backend.commit(changes)
    }
}

/// Execute one operation. Guarding happens before this point.
pub(crate) fn execute<B: Backend>(backend: &mut B, op: Operation) -> Result<Outcome> {
    let mut txn = Txn::new(backend);
    match op {
        Operation::ReadMany { table, filter, read } => Ok(read_many(matching(&txn, table, &filter)?, read)),
        Operation::WriteMany { table, filter, write } => {
            if let Write::Update(patch) = &write {
                reject_id_change(patch)?;
            }
            let targets = matching(&txn, table, &filter)?;
            let n = targets.len() as u64;
            match write {
                Write::Update(patch) => {
                    let now = now();
                    for old in targets {
                        let mut row = old.clone();
                        apply_patch(&mut row, &patch, &now);
                        check_unique(&txn, table, &row)?;
                        txn.put_row(table, Some(&old), row)?;
                    }
                }
                Write::Delete => {
                    for row in &targets {
                        txn.delete_row(table, row)?;
                    }
                }
            }
            txn.commit()?;
            Ok(Outcome::Count(n))
        }
        Operation::CreateOne { table, data } => {
            let row = insert(&mut txn, table, data)?;
            txn.commit()?;
            Ok(Outcome::Row(Some(row)))
        }
        Operation::CreateMany { table, data } => {
            let n = data.len() as u64;
            for raw in data {
                insert(&mut txn, table, raw)?;
            }
            txn.commit()?;
            Ok(Outcome::Count(n))
        }
        Operation::Upsert { table, key, create, update } => upsert(txn, table, &key, create, &update),
        Operation::SingleRow { table, id, action } => single_row(txn, table, &id, action),
    }
}

/// Rows that could match `filter`, read through the narrowest entries the
/// filter allows: a pinned `id` is one point read, a fully pinned unique
/// constraint is an index lookup plus a point read, a pinned `tenant_id`
/// walks that tenant's prefix. Anything else walks every row.
fn candidates<B: Backend>(txn: &Txn<'_, B>, table: Table, filter: &Filter) -> Result<Vec<Row>> {
    if let Some(id) = filter.pinned("id") {
        return match id.as_str() {
            Some(id) => Ok(txn.row(table, id)?.into_iter().collect()),
            None => Ok(Vec::new()),
        };
    }

    for constraint in table.unique_constraints() {
        let pinned: Option<Vec<Value>> = constraint.fields.iter().map(|f| filter.pinned(f).cloned()).collect();
        if let Some(values) = pinned {
            return match txn.owner(table, &keys::unique_key(constraint, &values)?)? {
                Some(id) => Ok(txn.row(table, &id)?.into_iter().collect()),
                None => Ok(Vec::new()),
            };
        }
    }

    if table.is_tenant_scoped() {
        if let Some(Value::String(tenant)) = filter.pinned("tenant_id") {
            let mut rows = Vec::new();
            for (key, entry) in txn.scan_prefix(table, &keys::tenant_prefix(tenant))? {
                let Entry::Id(id) = entry else { return Err(misplaced(table, &key)) };
                rows.extend(txn.row(table, &id)?);
            }
            return Ok(rows);
        }
    }

    txn.scan_prefix(table, keys::ROW_PREFIX)?
        .into_iter()
        .map(|(key, entry)| match entry {
            Entry::Row(row) => Ok(row),
            Entry::Id(_) => Err(misplaced(table, &key)),
        })
        .collect()
}

fn matching<B: Backend>(txn: &Txn<'_, B>, table: Table, filter: &Filter) -> Result<Vec<Row>> {
    Ok(candidates(txn, table, filter)?.into_iter().filter(|r| filter.matches(r)).collect())
}

fn read_many(mut rows: Vec<Row>, read: Read) -> Outcome {
    match read {
        Read::List(Page { order, limit, offset }) => {
            if let Some(order) = &order {
                sort_rows(&mut rows, order);
            }
            let rows = rows.into_iter().skip(offset);
            Outcome::Rows(match limit {
                Some(n) => rows.take(n).collect(),
                None => rows.collect(),
            })
        }
        Read::First(order) => {
            if let Some(order) = &order {
                sort_rows(&mut rows, order);
            }
            Outcome::Row(rows.into_iter().next())
        }
        Read::Count => Outcome::Count(rows.len() as u64),
        Read::Aggregate(agg) => Outcome::Scalar(aggregate(&rows, &agg)),
    }
}

fn insert<B: Backend>(txn: &mut Txn<'_, B>, table: Table, data: Row) -> Result<Row> {
    let row = prepare_insert(table, data)?;
    let id = row_id(table, &row)?;
    if txn.get(table, &keys::row_key(&id))?.is_some() {
        return Err(StoreError::UniqueViolation {
            table: table.name(),
            constraint: format!("{}_pkey", table.name()),
        });
    }
    check_unique(txn, table, &row)?;
    txn.put_row(table, None, row.clone())?;
    Ok(row)
}

fn upsert<B: Backend>(mut txn: Txn<'_, B>, table: Table, key: &UniqueKey, create: Row, update: &Patch) -> Result<Outcome> {
    validate_upsert_key(table, key)?;
    reject_id_change(update)?;

    let row = match matching(&txn, table, &key.filter())?.into_iter().next() {
        Some(old) => {
            let mut row = old.clone();
            apply_patch(&mut row, update, &now());
            check_unique(&txn, table, &row)?;
            txn.put_row(table, Some(&old), row.clone())?;
            row
        }
        None => {
            let mut create = create;
            for (field, value) in key.fields() {
                create.entry(field.clone()).or_insert_with(|| value.clone());
            }
            insert(&mut txn, table, create)?
        }
    };
    txn.commit()?;
    Ok(Outcome::Row(Some(row)))
}

fn single_row<B: Backend>(mut txn: Txn<'_, B>, table: Table, id: &Value, action: SingleRowAction) -> Result<Outcome> {
    let found = match id.as_str() {
        Some(key) => txn.row(table, key)?,
        None => None,
    };

    match action {
        SingleRowAction::Fetch => Ok(Outcome::Row(found)),
        SingleRowAction::Update(patch) => {
            reject_id_change(&patch)?;
            let old = found.ok_or_else(|| not_found(table, id))?;
            let mut row = old.clone();
            apply_patch(&mut row, &patch, &now());
            check_unique(&txn, table, &row)?;
            txn.put_row(table, Some(&old), row.clone())?;
            txn.commit()?;
            Ok(Outcome::Row(Some(row)))
        }
        SingleRowAction::Delete => {
            let row = found.ok_or_else(|| not_found(table, id))?;
            txn.delete_row(table, &row)?;
            txn.commit()?;
            Ok(Outcome::Row(Some(row)))
        }
    }
}

// ============================================================================
// Row helpers
// ============================================================================

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn not_found(table: Table, id: &Value) -> StoreError {
    StoreError::NotFound { table: table.name(), id: value_key(id) }
}

fn misplaced(table: Table, key: &str) -> StoreError {
    StoreError::Database(format!("{table} entry {key} has the wrong shape"))
}

fn value_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn row_id(table: Table, row: &Row) -> Result<String> {
    match row.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(StoreError::InvalidQuery(format!("{table} row without string id"))),
    }
}

/// Assign defaults: id, `created_at`, and for versioned tables `version = 1`
/// and `updated_at`.
fn prepare_insert(table: Table, mut row: Row) -> Result<Row> {
    match row.get("id") {
        None | Some(Value::Null) => {
            row.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        Some(Value::String(s)) if !s.is_empty() => {}
        Some(_) => return Err(StoreError::InvalidQuery(format!("{table} id must be a string"))),
    }
    let now = now();
    if row.get("created_at").map_or(true, Value::is_null) {
        row.insert("created_at".into(), now.clone());
    }
    if table.is_versioned() {
        if row.get("version").map_or(true, Value::is_null) {
            row.insert("version".into(), Value::from(1));
        }
        if row.get("updated_at").map_or(true, Value::is_null) {
            row.insert("updated_at".into(), now);
        }
    }
    Ok(row)
}

fn apply_patch(row: &mut Row, patch: &Patch, now: &Value) {
    patch.apply(row);
    if row.contains_key("updated_at") && !patch.touches("updated_at") {
        row.insert("updated_at".into(), now.clone());
    }
}

fn reject_id_change(patch: &Patch) -> Result<()> {
    if patch.touches("id") {
        return Err(StoreError::InvalidQuery("primary key is immutable".into()));
    }
    Ok(())
}

/// Constraint tuple of `row`. A missing column counts as `null`.
fn tuple(row: &Row, fields: &[&str]) -> Vec<Value> {
    fields.iter().map(|f| row.get(*f).cloned().unwrap_or(Value::Null)).collect()
}

/// Every index entry `row` owns.
fn index_keys(table: Table, row: &Row) -> Result<BTreeSet<String>> {
    let id = row_id(table, row)?;
    let mut out = BTreeSet::new();
    if table.is_tenant_scoped() {
        if let Some(Value::String(tenant)) = row.get("tenant_id") {
            out.insert(keys::tenant_key(tenant, &id));
        }
    }
    for constraint in table.unique_constraints() {
        out.insert(keys::unique_key(constraint, &tuple(row, constraint.fields))?);
    }
    Ok(out)
}

/// Fail if another row already owns one of `row`'s unique tuples. `null`
/// compares equal to `null`.
fn check_unique<B: Backend>(txn: &Txn<'_, B>, table: Table, row: &Row) -> Result<()> {
    let id = row_id(table, row)?;
    for constraint in table.unique_constraints() {
        let key = keys::unique_key(constraint, &tuple(row, constraint.fields))?;
        if txn.owner(table, &key)?.is_some_and(|owner| owner != id) {
            return Err(StoreError::UniqueViolation {
                table: table.name(),
                constraint: constraint.name.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_upsert_key(table: Table, key: &UniqueKey) -> Result<()> {
    let mut fields: Vec<&str> = key.fields().iter().map(|(f, _)| f.as_str()).collect();
    fields.sort_unstable();
    if fields.is_empty() {
        return Err(StoreError::InvalidQuery(format!("upsert on {table} needs a key")));
    }
    if fields == ["id"] {
        return Ok(());
    }
    let declared = table.unique_constraints().iter().any(|c| {
        let mut cf = c.fields.to_vec();
        cf.sort_unstable();
        cf == fields
    });
    if declared {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(format!(
            "upsert key ({}) on {table} is not a unique constraint",
            fields.join(", ")
        )))
    }
}

// ============================================================================
// Ordering and aggregates
// ============================================================================

fn sort_rows(rows: &mut [Row], order: &OrderBy) {
    rows.sort_by(|a, b| {
        let primary = cmp_values(a.get(&order.field), b.get(&order.field));
        let primary = if order.descending { primary.reverse() } else { primary };
        primary.then_with(|| cmp_values(a.get("id"), b.get("id")))
    });
}

/// Total order over JSON scalars. `null`/missing sorts first; RFC 3339
/// strings compare as instants.
pub(crate) fn cmp_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(f64::NAN)
                .partial_cmp(&y.as_f64().unwrap_or(f64::NAN))
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

const fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn aggregate(rows: &[Row], agg: &Aggregate) -> Value {
    let field = match agg {
        Aggregate::Sum(f) | Aggregate::Min(f) | Aggregate::Max(f) => f,
    };
    let values: Vec<&Value> = rows.iter().filter_map(|r| r.get(field)).filter(|v| v.is_number()).collect();
    if values.is_empty() {
        return Value::Null;
    }
    match agg {
        Aggregate::Sum(_) => {
            if values.iter().all(|v| v.is_i64()) {
                Value::from(values.iter().filter_map(|v| v.as_i64()).fold(0i64, i64::saturating_add))
            } else {
                Value::from(values.iter().filter_map(|v| v.as_f64()).sum::<f64>())
            }
        }
        Aggregate::Min(_) => values
            .into_iter()
            .min_by(|a, b| cmp_values(Some(a), Some(b)))
            .cloned()
            .unwrap_or(Value::Null),
        Aggregate::Max(_) => values
            .into_iter()
            .max_by(|a, b| cmp_values(Some(a), Some(b)))
            .cloned()
            .unwrap_or(Value::Null),
    }
}
