//! Tenant-guarded storage layer for tenantry.
//!
//! This crate provides the backing store for every tenantry record and the
//! isolation layer in front of it.
//!
//! # Architecture
//!
//! - [`Store`]: executes one [`Operation`] atomically. Implemented by
//!   [`MemoryStore`] and, behind the `rocksdb-backend` feature, `RocksStore`
//!   (one column family per table, CBOR rows). Rows are keyed by id next to
//!   tenant-prefixed and unique index entries, so id, unique-column and
//!   tenant-scoped reads never walk the whole table.
//! - [`TenantDb`]: a handle bound to one tenant. Reads and many-row writes
//!   are ANDed with the tenant filter, creates are stamped with the tenant,
//!   upserts must be keyed on a tenant composite, and bare-id access is
//!   refused with a [`GuardViolation`].
//! - [`SystemDb`]: the handle for system tables; tenant-scoped tables are
//!   unreachable through it.
//! - [`update_versioned`]: optimistic concurrency as one conditional update.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tenantry_core::{Product, TenantId};
//! use tenantry_store::{DataAccess, Filter, MemoryStore, Page, TenantDb};
//!
//! let store = Arc::new(MemoryStore::new());
//! let tenant = TenantId::generate();
//! let db = TenantDb::new(store, tenant);
//!
//! db.create(&Product::new(tenant, "SKU-1", "Widget", 499)).unwrap();
//! let products: Vec<Product> = db.find_many(Filter::All, Page::default()).unwrap();
//! assert_eq!(products.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod engine;
pub mod error;
pub mod guard;
mod keys;
pub mod memory;
pub mod occ;
pub mod query;
pub mod record;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{GuardReason, GuardViolation, Result, StoreError};
pub use guard::{DataAccess, SystemDb, TenantDb};
pub use memory::MemoryStore;
pub use occ::update_versioned;
pub use query::{
    Aggregate, Filter, Operation, OrderBy, Outcome, Page, Patch, Read, Row, SingleRowAction,
    UniqueKey, Write,
};
pub use record::Record;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;
pub use schema::{Table, UniqueConstraint};

/// The storage trait every backend implements.
///
/// Each call is atomic with respect to every other call on the same store:
/// unique-constraint inserts and conditional updates behave like single
/// statements, which is what idempotency reservation and optimistic
/// concurrency rely on.
pub trait Store: Send + Sync {
    /// Execute one operation.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` when an insert or update would
    /// break a unique constraint, `StoreError::NotFound` for single-row
    /// writes to missing rows, and `StoreError::Database` on backend failure.
    fn execute(&self, op: Operation) -> Result<Outcome>;
}
