//! Tenant isolation guard.
//!
//! [`TenantDb`] is bound to one tenant at construction and polices every
//! operation on tenant-scoped tables before it reaches the store:
//!
//! | Operation | Policy |
//! |---|---|
//! | list / first / count / aggregate / update-many / delete-many | filter ANDed with `tenant_id = bound` |
//! | create / create-many | per row: inject `tenant_id`, or require it to equal the bound tenant |
//! | upsert | lookup key must contain `tenant_id = bound` |
//! | fetch / update / delete by bare id | always rejected |
//!
//! [`SystemDb`] is the handle for pre-tenant work (host resolution, users,
//! idempotency records). It refuses tenant-scoped tables outright.
//!
//! Both implement [`DataAccess`], whose provided methods give typed access
//! on top of [`DataAccess::execute`].

use std::sync::Arc;

use serde_json::Value;

use tenantry_core::TenantId;

use crate::error::{GuardReason, GuardViolation, Result};
use crate::query::{Aggregate, Filter, Operation, Outcome, Page, Patch, Read, Row, SingleRowAction, UniqueKey, Write};
use crate::record::{from_row, to_row, Record};
use crate::schema::Table;
use crate::Store;

/// Typed data access over a guarded [`Store`].
pub trait DataAccess {
    /// Execute one operation after this handle's policy has been applied.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::GuardViolation` when the policy rejects the
    /// operation, otherwise whatever the store returns.
    fn execute(&self, op: Operation) -> Result<Outcome>;

    // =========================================================================
    // Multi-row reads
    // =========================================================================

    /// List matching records.
    fn find_many<R: Record>(&self, filter: Filter, page: Page) -> Result<Vec<R>> {
        self.execute(Operation::ReadMany { table: R::TABLE, filter, read: Read::List(page) })?
            .into_rows()?
            .into_iter()
            .map(from_row)
            .collect()
    }

    /// First matching record in `id` order.
    fn find_first<R: Record>(&self, filter: Filter) -> Result<Option<R>> {
        self.first_row(R::TABLE, filter)?.map(from_row).transpose()
    }

    /// First matching raw row.
    fn first_row(&self, table: Table, filter: Filter) -> Result<Option<Row>> {
        self.execute(Operation::ReadMany { table, filter, read: Read::First(None) })?
            .into_row()
    }

    /// Count matching records.
    fn count<R: Record>(&self, filter: Filter) -> Result<u64> {
        self.execute(Operation::ReadMany { table: R::TABLE, filter, read: Read::Count })?
            .into_count()
    }

    /// Aggregate a numeric column over matching records.
    fn aggregate<R: Record>(&self, filter: Filter, aggregate: Aggregate) -> Result<Value> {
        self.execute(Operation::ReadMany { table: R::TABLE, filter, read: Read::Aggregate(aggregate) })?
            .into_scalar()
    }

    // =========================================================================
    // Multi-row writes
    // =========================================================================

    /// Patch every matching record. Returns the affected count.
    fn update_many<R: Record>(&self, filter: Filter, patch: Patch) -> Result<u64> {
        self.execute(Operation::WriteMany { table: R::TABLE, filter, write: Write::Update(patch) })?
            .into_count()
    }

    /// Delete every matching record. Returns the affected count.
    fn delete_many<R: Record>(&self, filter: Filter) -> Result<u64> {
        self.execute(Operation::WriteMany { table: R::TABLE, filter, write: Write::Delete })?
            .into_count()
    }

    // =========================================================================
    // Creates
    // =========================================================================

    /// Insert a typed record.
    fn create<R: Record>(&self, record: &R) -> Result<R> {
        self.insert(to_row(record)?)
    }

    /// Insert a raw row (which may name its tenant through a `tenant`
    /// relation instead of `tenant_id`).
    fn insert<R: Record>(&self, data: Row) -> Result<R> {
        let row = self
            .execute(Operation::CreateOne { table: R::TABLE, data })?
            .into_row()?
            .ok_or_else(|| crate::StoreError::InvalidQuery("create returned no row".into()))?;
        from_row(row)
    }

    /// Insert several records, all or nothing.
    fn create_many<R: Record>(&self, records: &[R]) -> Result<u64> {
        let data = records.iter().map(to_row).collect::<Result<Vec<_>>>()?;
        self.execute(Operation::CreateMany { table: R::TABLE, data })?.into_count()
    }

    /// Update the record matching `key`, or insert `create`.
    fn upsert<R: Record>(&self, key: UniqueKey, create: &R, update: Patch) -> Result<R> {
        let create = to_row(create)?;
        let row = self
            .execute(Operation::Upsert { table: R::TABLE, key, create, update })?
            .into_row()?
            .ok_or_else(|| crate::StoreError::InvalidQuery("upsert returned no row".into()))?;
        from_row(row)
    }

    // =========================================================================
    // Bare primary key access (banned for tenant-scoped tables)
    // =========================================================================

    /// Fetch by bare id.
    fn find_unique<R: Record>(&self, id: impl Into<Value>) -> Result<Option<R>> {
        self.execute(Operation::SingleRow { table: R::TABLE, id: id.into(), action: SingleRowAction::Fetch })?
            .into_row()?
            .map(from_row)
            .transpose()
    }

    /// Update by bare id.
    fn update_by_id<R: Record>(&self, id: impl Into<Value>, patch: Patch) -> Result<R> {
        let row = self
            .execute(Operation::SingleRow { table: R::TABLE, id: id.into(), action: SingleRowAction::Update(patch) })?
            .into_row()?
            .ok_or_else(|| crate::StoreError::InvalidQuery("update returned no row".into()))?;
        from_row(row)
    }

    /// Delete by bare id.
    fn delete_by_id<R: Record>(&self, id: impl Into<Value>) -> Result<R> {
        let row = self
            .execute(Operation::SingleRow { table: R::TABLE, id: id.into(), action: SingleRowAction::Delete })?
            .into_row()?
            .ok_or_else(|| crate::StoreError::InvalidQuery("delete returned no row".into()))?;
        from_row(row)
    }
}

// ============================================================================
// Tenant-bound handle
// ============================================================================

/// Data access permanently bound to one tenant.
#[derive(Clone)]
pub struct TenantDb {
    store: Arc<dyn Store>,
    tenant_id: TenantId,
}

impl TenantDb {
    /// Bind a handle to `tenant_id`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, tenant_id: TenantId) -> Self {
        Self { store, tenant_id }
    }

    /// The bound tenant.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Apply the isolation policy to one operation.
    ///
    /// Non-tenant tables pass through untouched.
    ///
    /// # Errors
    ///
    /// Returns the violation when the operation could escape the tenant.
    pub fn guard(&self, op: Operation) -> std::result::Result<Operation, GuardViolation> {
        let table = op.table();
        if !table.is_tenant_scoped() {
            return Ok(op);
        }
        let kind = op.kind();
        let deny = |reason| GuardViolation::new(table.name(), reason);

        match op {
            Operation::ReadMany { table, filter, read } => Ok(Operation::ReadMany {
                table,
                filter: self.scope(filter),
                read,
            }),
            Operation::WriteMany { table, filter, write } => {
                if let Write::Update(patch) = &write {
                    self.check_patch(table, patch)?;
                }
                Ok(Operation::WriteMany { table, filter: self.scope(filter), write })
            }
            Operation::CreateOne { table, data } => Ok(Operation::CreateOne {
                table,
                data: self.claim(table, data)?,
            }),
            Operation::CreateMany { table, data } => Ok(Operation::CreateMany {
                table,
                data: data
                    .into_iter()
                    .map(|row| self.claim(table, row))
                    .collect::<std::result::Result<_, _>>()?,
            }),
            Operation::Upsert { table, key, create, update } => {
                match key.get("tenant_id") {
                    Some(v) if self.is_bound(v) => {}
                    Some(_) => return Err(deny(GuardReason::TenantMismatch)),
                    None => return Err(deny(GuardReason::UpsertKeyNotTenantScoped)),
                }
                self.check_patch(table, &update)?;
                Ok(Operation::Upsert {
                    table,
                    key,
                    create: self.claim(table, create)?,
                    update,
                })
            }
            Operation::SingleRow { .. } => Err(deny(GuardReason::BannedPrimitive(kind))),
        }
    }

    fn bound(&self) -> Value {
        Value::String(self.tenant_id.to_string())
    }

    /// Exact match, the same comparison the store applies to `tenant_id`.
    fn is_bound(&self, v: &Value) -> bool {
        v.as_str() == Some(self.tenant_id.to_string().as_str())
    }

    fn scope(&self, filter: Filter) -> Filter {
        Filter::Eq("tenant_id".into(), self.bound()).and(filter)
    }

    /// Stamp a row being created with the bound tenant.
    ///
    /// Accepts `tenant_id` (absent, null or equal to the bound tenant) or a
    /// `tenant: {connect: {id}}` / `tenant: {connect: {where: {id}}}`
    /// relation, which is normalized to `tenant_id`. Naming the tenant both
    /// ways is ambiguous and rejected.
    fn claim(&self, table: Table, mut row: Row) -> std::result::Result<Row, GuardViolation> {
        let deny = |reason| GuardViolation::new(table.name(), reason);

        if row.contains_key("tenant_id") && row.contains_key("tenant") {
            return Err(deny(GuardReason::AmbiguousTenant));
        }

        if let Some(relation) = row.remove("tenant") {
            let Value::Object(relation) = relation else {
                return Err(deny(GuardReason::TenantMismatch));
            };
            let connect = relation.get("connect");
            let connected = connect
                .and_then(|c| c.get("id"))
                .or_else(|| connect.and_then(|c| c.get("where")).and_then(|w| w.get("id")));
            if let Some(id) = connected {
                if !self.is_bound(id) {
                    return Err(deny(GuardReason::TenantMismatch));
                }
            }
            row.insert("tenant_id".into(), self.bound());
            return Ok(row);
        }

        match row.get("tenant_id") {
            None | Some(Value::Null) => {
                row.insert("tenant_id".into(), self.bound());
                Ok(row)
            }
            Some(v) if self.is_bound(v) => {
                row.insert("tenant_id".into(), self.bound());
                Ok(row)
            }
            Some(_) => Err(deny(GuardReason::TenantMismatch)),
        }
    }

    fn check_patch(&self, table: Table, patch: &Patch) -> std::result::Result<(), GuardViolation> {
        let moves_tenant = patch.touches("tenant")
            || patch.increment.iter().any(|(f, _)| f == "tenant_id")
            || patch.set.get("tenant_id").is_some_and(|v| !self.is_bound(v));
        if moves_tenant {
            Err(GuardViolation::new(table.name(), GuardReason::TenantImmutable))
        } else {
            Ok(())
        }
    }
}

impl DataAccess for TenantDb {
    fn execute(&self, op: Operation) -> Result<Outcome> {
        let kind = op.kind();
        let op = self.guard(op).map_err(|violation| {
            tracing::error!(
                tenant_id = %self.tenant_id,
                table = violation.table,
                op = kind,
                reason = %violation.reason,
                "Tenant guard violation"
            );
            violation
        })?;
        self.store.execute(op)
    }
}

impl std::fmt::Debug for TenantDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantDb").field("tenant_id", &self.tenant_id).finish_non_exhaustive()
    }
}

// ============================================================================
// System handle
// ============================================================================

/// Data access for system tables only.
#[derive(Clone)]
pub struct SystemDb {
    store: Arc<dyn Store>,
}

impl SystemDb {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Bind a tenant handle over the same store.
    #[must_use]
    pub fn for_tenant(&self, tenant_id: TenantId) -> TenantDb {
        TenantDb::new(Arc::clone(&self.store), tenant_id)
    }
}

impl DataAccess for SystemDb {
    fn execute(&self, op: Operation) -> Result<Outcome> {
        let table = op.table();
        if table.is_tenant_scoped() {
            tracing::error!(table = table.name(), op = op.kind(), "Unscoped access to tenant table");
            return Err(GuardViolation::new(table.name(), GuardReason::UnscopedAccess).into());
        }
        self.store.execute(op)
    }
}

impl std::fmt::Debug for SystemDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemDb").finish_non_exhaustive()
    }
}
