//! Pagination and ordering types for listing queries
//!
//! # Example
//!
//! ```rust
//! use docwork::models::Product;
//! use docwork::repository::{OrderDirection, QueryParams};
//!
//! let mut params = QueryParams::<Product>::new()
//!     .sort_by("price", OrderDirection::Descending)
//!     .with_limit(20)
//!     .with_offset(40);
//! params.validate();
//!
//! assert_eq!(params.page_info(), (3, 20));
//! ```

use bson::Document;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest page size a listing may request
pub const MAX_LIMIT: i64 = 1000;

/// Page size used when none (or a negative one) is given
pub const DEFAULT_LIMIT: i64 = 10;

/// Direction for ordering results
///
/// # Example
///
/// ```rust
/// use docwork::repository::OrderDirection;
///
/// assert_eq!(format!("{}", OrderDirection::Ascending), "asc");
/// assert_eq!(format!("{}", OrderDirection::Descending), "desc");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    #[serde(rename = "desc")]
    Descending,
}

impl OrderDirection {
    /// Native sort value: `1` ascending, `-1` descending
    pub const fn sort_value(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Listing parameters: optional sparse filter, ordering and paging
///
/// A `limit` of `0` means "no limit" when querying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "E: Serialize + serde::de::DeserializeOwned")]
pub struct QueryParams<E> {
    /// Sparse filter entity; `None` lists everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<E>,

    /// Ordered sort keys
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<(String, OrderDirection)>,

    /// Relation names to load; no relations exist so this is carried but unused
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: i64,

    /// Number of results to skip
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl<E> Default for QueryParams<E> {
    fn default() -> Self {
        Self {
            filter: None,
            sort: Vec::new(),
            include: Vec::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl<E> QueryParams<E> {
    /// First page of ten, unfiltered
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sparse filter entity
    #[must_use]
    pub fn with_filter(mut self, filter: E) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Append a sort key; earlier keys take precedence
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.sort.push((field.into(), direction));
        self
    }

    /// Set the page size
    #[must_use]
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set the number of results to skip
    #[must_use]
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Clamp limit and offset into range
    ///
    /// Negative limits become [`DEFAULT_LIMIT`], limits above [`MAX_LIMIT`]
    /// become `MAX_LIMIT` and negative offsets become `0`.
    pub fn validate(&mut self) {
        if self.limit < 0 {
            self.limit = DEFAULT_LIMIT;
        }
        if self.limit > MAX_LIMIT {
            self.limit = MAX_LIMIT;
        }
        if self.offset < 0 {
            self.offset = 0;
        }
    }

    /// `(page, size)` with `size = limit` (or 10 when zero) and `page = offset / size + 1`
    pub fn page_info(&self) -> (i64, i64) {
        let size = if self.limit == 0 {
            DEFAULT_LIMIT
        } else {
            self.limit
        };
        (self.offset / size + 1, size)
    }

    /// Native sort document, `None` without sort keys
    pub fn sort_document(&self) -> Option<Document> {
        if self.sort.is_empty() {
            return None;
        }
        let mut sort = Document::new();
        for (field, direction) in &self.sort {
            sort.insert(field.clone(), direction.sort_value());
        }
        Some(sort)
    }
}
