//! Query and operation model.
//!
//! Every data access is expressed as one [`Operation`] variant. The tenant
//! guard matches on the variant exhaustively, so a new kind of access cannot
//! be added without deciding how it is scoped.

use serde_json::{Map, Value};

use crate::error::{Result, StoreError};
use crate::schema::Table;

/// A stored row: a JSON object with snake_case columns.
pub type Row = Map<String, Value>;

// ============================================================================
// Filters
// ============================================================================

/// Row predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every row.
    All,
    /// Column equals value. A missing column equals `null`.
    Eq(String, Value),
    /// String column equals value, ASCII case-insensitively.
    EqIgnoreCase(String, String),
    /// String column contains the needle, case-insensitively.
    Contains(String, String),
    /// All sub-filters match. Empty matches everything.
    And(Vec<Filter>),
    /// Any sub-filter matches. Empty matches nothing.
    Or(Vec<Filter>),
}

impl Filter {
    /// `field = value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    /// `lower(field) = lower(value)`.
    pub fn eq_ignore_case(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::EqIgnoreCase(field.into(), value.into())
    }

    /// `field ILIKE %needle%`.
    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains(field.into(), needle.into())
    }

    /// Conjunction, flattening `All`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::All, f) | (f, Self::All) => f,
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), f) => {
                a.push(f);
                Self::And(a)
            }
            (f, g) => Self::And(vec![f, g]),
        }
    }

    /// Evaluate against a row.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::All => true,
            Self::Eq(field, value) => row.get(field).unwrap_or(&Value::Null) == value,
            Self::EqIgnoreCase(field, value) => row
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.eq_ignore_ascii_case(value)),
            Self::Contains(field, needle) => row
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
            Self::And(filters) => filters.iter().all(|f| f.matches(row)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(row)),
        }
    }

    /// The value `field` must equal for any row to match: an `Eq` on
    /// `field` at the top level or inside a conjunction.
    #[must_use]
    pub fn pinned(&self, field: &str) -> Option<&Value> {
        match self {
            Self::Eq(f, value) if f == field => Some(value),
            Self::And(filters) => filters.iter().find_map(|f| f.pinned(field)),
            _ => None,
        }
    }
}

// ============================================================================
// Ordering and paging
// ============================================================================

/// Sort key. Ties are broken by `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column.
    pub field: String,
    /// Descending when true.
    pub descending: bool,
}

impl OrderBy {
    /// Ascending on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), descending: false }
    }

    /// Descending on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), descending: true }
    }
}

/// Ordering plus offset / limit for list reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Sort key, `id` order when absent.
    pub order: Option<OrderBy>,
    /// Maximum rows returned.
    pub limit: Option<usize>,
    /// Rows skipped.
    pub offset: usize,
}

impl Page {
    /// Unbounded page in `order`.
    #[must_use]
    pub fn ordered(order: OrderBy) -> Self {
        Self { order: Some(order), ..Self::default() }
    }

    /// Set the limit.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the offset.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

// ============================================================================
// Writes
// ============================================================================

/// Column changes applied by updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    /// Columns overwritten.
    pub set: Row,
    /// Integer columns incremented (missing counts as 0).
    pub increment: Vec<(String, i64)>,
}

impl Patch {
    /// Empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `field`.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    /// Add `by` to `field`.
    #[must_use]
    pub fn increment(mut self, field: impl Into<String>, by: i64) -> Self {
        self.increment.push((field.into(), by));
        self
    }

    /// No column changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.increment.is_empty()
    }

    /// Whether the patch writes `field`.
    #[must_use]
    pub fn touches(&self, field: &str) -> bool {
        self.set.contains_key(field) || self.increment.iter().any(|(f, _)| f == field)
    }

    /// Apply to a row in place.
    pub fn apply(&self, row: &mut Row) {
        for (k, v) in &self.set {
            row.insert(k.clone(), v.clone());
        }
        for (k, by) in &self.increment {
            let current = row.get(k).and_then(Value::as_i64).unwrap_or(0);
            row.insert(k.clone(), Value::from(current.saturating_add(*by)));
        }
    }
}

/// Lookup key for upserts: exact values for the columns of one unique
/// constraint (or `id`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniqueKey(Vec<(String, Value)>);

impl UniqueKey {
    /// Empty key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((field.into(), value.into()));
        self
    }

    /// Column / value pairs.
    #[must_use]
    pub fn fields(&self) -> &[(String, Value)] {
        &self.0
    }

    /// Value of one column in the key.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.iter().find(|(f, _)| f == field).map(|(_, v)| v)
    }

    /// Equality filter over every column of the key.
    #[must_use]
    pub fn filter(&self) -> Filter {
        Filter::And(self.0.iter().map(|(f, v)| Filter::Eq(f.clone(), v.clone())).collect())
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Kinds of multi-row read.
#[derive(Debug, Clone, PartialEq)]
pub enum Read {
    /// All matching rows in page order.
    List(Page),
    /// First matching row.
    First(Option<OrderBy>),
    /// Number of matching rows.
    Count,
    /// Numeric aggregate over matching rows.
    Aggregate(Aggregate),
}

/// Numeric aggregates. Non-numeric values are ignored; no numeric values
/// yields `null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    /// Sum of a column.
    Sum(String),
    /// Minimum of a column.
    Min(String),
    /// Maximum of a column.
    Max(String),
}

/// Kinds of multi-row write.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Apply a patch to every match.
    Update(Patch),
    /// Delete every match.
    Delete,
}

/// Actions addressed by bare primary key.
#[derive(Debug, Clone, PartialEq)]
pub enum SingleRowAction {
    /// Fetch one row.
    Fetch,
    /// Update one row.
    Update(Patch),
    /// Delete one row.
    Delete,
}

/// One data access, tagged by category.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// list / first / count / aggregate.
    ReadMany {
        /// Target table.
        table: Table,
        /// Row predicate.
        filter: Filter,
        /// Read kind.
        read: Read,
    },
    /// update-many / delete-many.
    WriteMany {
        /// Target table.
        table: Table,
        /// Row predicate.
        filter: Filter,
        /// Write kind.
        write: Write,
    },
    /// Insert one row.
    CreateOne {
        /// Target table.
        table: Table,
        /// Row data.
        data: Row,
    },
    /// Insert several rows, all or nothing.
    CreateMany {
        /// Target table.
        table: Table,
        /// Rows.
        data: Vec<Row>,
    },
    /// Update the row matching `key`, or insert `create`.
    Upsert {
        /// Target table.
        table: Table,
        /// Lookup key.
        key: UniqueKey,
        /// Row inserted when nothing matches.
        create: Row,
        /// Patch applied when a row matches.
        update: Patch,
    },
    /// fetch / update / delete by bare id.
    SingleRow {
        /// Target table.
        table: Table,
        /// Primary key.
        id: Value,
        /// Action.
        action: SingleRowAction,
    },
}

impl Operation {
    /// Target table.
    #[must_use]
    pub const fn table(&self) -> Table {
        match self {
            Self::ReadMany { table, .. }
            | Self::WriteMany { table, .. }
            | Self::CreateOne { table, .. }
            | Self::CreateMany { table, .. }
            | Self::Upsert { table, .. }
            | Self::SingleRow { table, .. } => *table,
        }
    }

    /// Short operation name for logs and errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ReadMany { read, .. } => match read {
                Read::List(_) => "find_many",
                Read::First(_) => "find_first",
                Read::Count => "count",
                Read::Aggregate(_) => "aggregate",
            },
            Self::WriteMany { write, .. } => match write {
                Write::Update(_) => "update_many",
                Write::Delete => "delete_many",
            },
            Self::CreateOne { .. } => "create",
            Self::CreateMany { .. } => "create_many",
            Self::Upsert { .. } => "upsert",
            Self::SingleRow { action, .. } => match action {
                SingleRowAction::Fetch => "find_unique",
                SingleRowAction::Update(_) => "update",
                SingleRowAction::Delete => "delete",
            },
        }
    }
}

/// Result of executing an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// List reads.
    Rows(Vec<Row>),
    /// First / create / upsert / single-row results.
    Row(Option<Row>),
    /// Counts and affected-row counts.
    Count(u64),
    /// Aggregates.
    Scalar(Value),
}

impl Outcome {
    /// Expect [`Outcome::Rows`].
    pub fn into_rows(self) -> Result<Vec<Row>> {
        match self {
            Self::Rows(rows) => Ok(rows),
            other => Err(unexpected("rows", &other)),
        }
    }

    /// Expect [`Outcome::Row`].
    pub fn into_row(self) -> Result<Option<Row>> {
        match self {
            Self::Row(row) => Ok(row),
            other => Err(unexpected("row", &other)),
        }
    }

    /// Expect [`Outcome::Count`].
    pub fn into_count(self) -> Result<u64> {
        match self {
            Self::Count(n) => Ok(n),
            other => Err(unexpected("count", &other)),
        }
    }

    /// Expect [`Outcome::Scalar`].
    pub fn into_scalar(self) -> Result<Value> {
        match self {
            Self::Scalar(v) => Ok(v),
            other => Err(unexpected("scalar", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &Outcome) -> StoreError {
    StoreError::InvalidQuery(format!("expected {wanted} outcome, got {got:?}"))
}
