//! Table definitions and unique constraints.
//!
//! Each table maps to one `RocksDB` column family of the same name. Rows are
//! keyed by their `id` field.

/// Every table the store knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Tenants, unique on `slug`.
    Tenants,
    /// Host to tenant mappings, unique on `host`.
    Domains,
    /// Users, unique on `email`.
    Users,
    /// Catalog products, tenant scoped and versioned.
    Products,
    /// Tenant memberships, tenant scoped and versioned.
    Memberships,
    /// Audit entries, tenant scoped.
    AuditLogs,
    /// Idempotency records, unique on the full fingerprint.
    IdempotencyRecords,
}

/// A named unique constraint over one or more columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueConstraint {
    /// Constraint name as reported in errors.
    pub name: &'static str,
    /// Columns, in key order.
    pub fields: &'static [&'static str],
}

impl Table {
    /// All tables, in column family creation order.
    pub const ALL: [Self; 7] = [
        Self::Tenants,
        Self::Domains,
        Self::Users,
        Self::Products,
        Self::Memberships,
        Self::AuditLogs,
        Self::IdempotencyRecords,
    ];

    /// Table / column family name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tenants => "tenants",
            Self::Domains => "domains",
            Self::Users => "users",
            Self::Products => "products",
            Self::Memberships => "memberships",
            Self::AuditLogs => "audit_logs",
            Self::IdempotencyRecords => "idempotency_records",
        }
    }

    /// Rows of this table carry a non-null, immutable `tenant_id` and may only
    /// be reached through a tenant-bound handle.
    #[must_use]
    pub const fn is_tenant_scoped(self) -> bool {
        matches!(self, Self::Products | Self::Memberships | Self::AuditLogs)
    }

    /// Rows carry an OCC `version` starting at 1.
    #[must_use]
    pub const fn is_versioned(self) -> bool {
        matches!(self, Self::Products | Self::Memberships)
    }

    /// Declared unique constraints, excluding the `id` primary key.
    ///
    /// Tenant-scoped tables are only ever unique on composites that lead with
    /// `tenant_id`.
    #[must_use]
    pub const fn unique_constraints(self) -> &'static [UniqueConstraint] {
        match self {
            Self::Tenants => &[UniqueConstraint { name: "tenants_slug_key", fields: &["slug"] }],
            Self::Domains => &[UniqueConstraint { name: "domains_host_key", fields: &["host"] }],
            Self::Users => &[UniqueConstraint { name: "users_email_key", fields: &["email"] }],
            Self::Products => &[UniqueConstraint {
                name: "products_tenant_id_sku_key",
                fields: &["tenant_id", "sku"],
            }],
            Self::Memberships => &[UniqueConstraint {
                name: "memberships_tenant_id_user_id_key",
                fields: &["tenant_id", "user_id"],
            }],
            Self::AuditLogs => &[],
            Self::IdempotencyRecords => &[UniqueConstraint {
                name: "idempotency_records_fingerprint_key",
                fields: &["key", "method", "path", "user_id", "tenant_id"],
            }],
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    Table::ALL.iter().map(|t| t.name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_scoped_constraints_lead_with_tenant_id() {
        for table in Table::ALL.into_iter().filter(|t| t.is_tenant_scoped()) {
            for c in table.unique_constraints() {
                assert_eq!(c.fields.first(), Some(&"tenant_id"), "{}", c.name);
            }
        }
    }

    #[test]
    fn versioned_tables_are_tenant_scoped() {
        for table in Table::ALL.into_iter().filter(|t| t.is_versioned()) {
            assert!(table.is_tenant_scoped());
        }
    }

    #[test]
    fn column_family_names_are_distinct() {
        let mut names = all_column_families();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Table::ALL.len());
    }
}
