//! HTTP handlers.

pub mod health;
pub mod members;
pub mod products;
pub mod public;
pub mod storefront;
pub mod tenant;

use serde::{Deserialize, Serialize};

use tenantry_store::Filter;

/// `?q=&limit=&offset=` for list routes.
///
/// Parsed leniently: unparseable numbers fall back to the defaults and
/// out-of-range limits are clamped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// Case-insensitive search text.
    pub q: Option<String>,
    /// Page size.
    pub limit: Option<String>,
    /// Rows to skip.
    pub offset: Option<String>,
}

impl ListQuery {
    /// Trimmed, non-empty search text.
    #[must_use]
    pub fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    /// Limit clamped to `1..=max`.
    #[must_use]
    pub fn limit(&self, default: usize, max: usize) -> usize {
        let max = i64::try_from(max).unwrap_or(i64::MAX);
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<i64>().ok())
            .map(|l| l.clamp(1, max))
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(default)
    }

    /// Offset, zero when absent or negative.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
            .as_deref()
            .and_then(|o| o.trim().parse::<i64>().ok())
            .and_then(|o| usize::try_from(o).ok())
            .unwrap_or(0)
    }
}

/// One page of a list response.
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    /// Rows on this page.
    pub items: Vec<T>,
    /// Offset of the next page, when this one was full.
    pub next_offset: Option<usize>,
}

impl<T> Paged<T> {
    /// Wrap a page fetched with `limit` at `offset`.
    #[must_use]
    pub fn new(items: Vec<T>, limit: usize, offset: usize) -> Self {
        let next_offset = (items.len() == limit).then_some(offset + limit);
        Self { items, next_offset }
    }
}

/// `contains(q)` over any of `fields`.
pub(crate) fn search_filter(q: &str, fields: &[&str]) -> Filter {
    Filter::Or(fields.iter().map(|f| Filter::contains(*f, q)).collect())
}
