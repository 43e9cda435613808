//! # Queries
//!
//! Identifies a live collection view. Two queries that select the same
//! documents in the same order compare equal, which is what lets the cache
//! share one remote subscription between observers.
//!
//! ## Canonical Form
//! ```text
//!   Query::collection("products").filter("brand", "Acme").filter("active", "true")
//!   Query::collection("products").filter("active", "true").filter("brand", "Acme")
//!                      │
//!                      ▼  filters kept sorted + deduplicated on insert
//!   products [active == true, brand == Acme]        ← same key, same Hash
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Equality filter on a top-level field.
///
/// Field values are compared by their string rendering (JSON strings as-is,
/// other values via their JSON text), so `"true"` matches both `true` and
/// `"true"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A live view over one remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    collection: String,
    filters: Vec<FieldFilter>,
    order_by: Option<OrderBy>,
}

impl Query {
    /// All documents of `collection`, in the source's natural order.
    pub fn collection(collection: impl Into<String>) -> Self {
        Query {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    /// Adds an equality filter.
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        let filter = FieldFilter {
            field: field.into(),
            value: value.into(),
        };
        if let Err(pos) = self.filters.binary_search(&filter) {
            self.filters.insert(pos, filter);
        }
        self
    }

    /// Sets the ordering, replacing any previous one.
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub fn ordering(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.collection)?;
        if !self.filters.is_empty() {
            let rendered: Vec<String> = self
                .filters
                .iter()
                .map(|flt| format!("{} == {}", flt.field, flt.value))
                .collect();
            write!(f, " [{}]", rendered.join(", "))?;
        }
        if let Some(order) = &self.order_by {
            let dir = match order.direction {
                Direction::Ascending => "asc",
                Direction::Descending => "desc",
            };
            write!(f, " order by {} {}", order.field, dir)?;
        }
        Ok(())
    }
}
