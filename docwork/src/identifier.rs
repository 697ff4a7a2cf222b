//! Fluent filter builder
//!
//! An [`Identifier`] accumulates `field OPERATOR value` conditions in
//! insertion order and renders them as a native filter document with
//! [`Identifier::to_filter`]. Conditions are keyed by a composite key made of
//! the field name and an operator suffix (`"age >"`, `"tags IN"`), so adding
//! the same condition twice replaces the earlier value.
//!
//! # Example
//!
//! ```rust
//! use bson::doc;
//! use docwork::identifier::Identifier;
//!
//! let filter = Identifier::new()
//!     .equal("name", "widget")
//!     .greater_than("price", 10.0)
//!     .to_filter();
//!
//! assert_eq!(filter, doc! { "name": "widget", "price": { "$gt": 10.0 } });
//! ```

use bson::{oid::ObjectId, Bson, Document};
use std::fmt;

use crate::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};

/// Condition operators and their composite-key suffixes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    GreaterThan,
    LessThan,
    In,
    Like,
    Between,
    IsNull,
    IsNotNull,
}

impl Operator {
    // Order in which suffixes are tried when parsing a composite key
    const PARSE_ORDER: [Operator; 7] = [
        Operator::IsNotNull,
        Operator::IsNull,
        Operator::Between,
        Operator::Like,
        Operator::In,
        Operator::GreaterThan,
        Operator::LessThan,
    ];

    fn suffix(self) -> &'static str {
        match self {
            Operator::GreaterThan => " >",
            Operator::LessThan => " <",
            Operator::In => " IN",
            Operator::Like => " LIKE",
            Operator::Between => " BETWEEN",
            Operator::IsNull => " IS NULL",
            Operator::IsNotNull => " IS NOT NULL",
        }
    }

    /// Render the operator document for a stored value
    ///
    /// Returns `None` for a malformed `BETWEEN` value, which is skipped.
    fn condition(self, value: &Bson) -> Option<Document> {
        let mut condition = Document::new();
        match self {
            Operator::GreaterThan => {
                condition.insert("$gt", value.clone());
            }
            Operator::LessThan => {
                condition.insert("$lt", value.clone());
            }
            Operator::In => {
                condition.insert("$in", value.clone());
            }
            Operator::Like => {
                condition.insert("$regex", value.clone());
                condition.insert("$options", "i");
            }
            Operator::Between => match value {
                Bson::Array(bounds) if bounds.len() == 2 => {
                    condition.insert("$gte", bounds[0].clone());
                    condition.insert("$lte", bounds[1].clone());
                }
                _ => return None,
            },
            Operator::IsNull => {
                condition.insert("$exists", false);
            }
            Operator::IsNotNull => {
                condition.insert("$exists", true);
            }
        }
        Some(condition)
    }
}

/// Split a composite key into its field and operator
fn parse_key(key: &str) -> (&str, Option<Operator>) {
    for op in Operator::PARSE_ORDER {
        if let Some(field) = key.strip_suffix(op.suffix()) {
            return (field, Some(op));
        }
    }
    (key, None)
}

fn is_operator_document(value: &Bson) -> bool {
    matches!(value, Bson::Document(doc) if !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')))
}

/// Insertion-ordered set of filter conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identifier {
    query: Document,
}

impl Identifier {
    /// Create an empty identifier (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// `field == value`
    #[must_use]
    pub fn equal(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.query.insert(field, value.into());
        self
    }

    /// `field` is one of `values`
    #[must_use]
    pub fn in_values<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.query
            .insert(format!("{}{}", field, Operator::In.suffix()), values);
        self
    }

    /// `field` matches `pattern` as a case-insensitive regular expression
    ///
    /// The pattern is passed through unescaped, so `.` or `*` keep their regex
    /// meaning. Use [`Identifier::like_literal`] to match text verbatim.
    #[must_use]
    pub fn like(mut self, field: &str, pattern: &str) -> Self {
        self.query
            .insert(format!("{}{}", field, Operator::Like.suffix()), pattern);
        self
    }

    /// `field` contains `text` literally, case-insensitive
    ///
    /// ```rust
    /// use docwork::identifier::Identifier;
    ///
    /// let id = Identifier::new().like_literal("name", "a.b");
    /// assert_eq!(id.get("name LIKE").and_then(|v| v.as_str()), Some(r"a\.b"));
    /// ```
    #[must_use]
    pub fn like_literal(self, field: &str, text: &str) -> Self {
        let escaped = regex::escape(text);
        self.like(field, &escaped)
    }

    /// `field > value`
    #[must_use]
    pub fn greater_than(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.query.insert(
            format!("{}{}", field, Operator::GreaterThan.suffix()),
            value.into(),
        );
        self
    }

    /// `field < value`
    #[must_use]
    pub fn less_than(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.query.insert(
            format!("{}{}", field, Operator::LessThan.suffix()),
            value.into(),
        );
        self
    }

    /// `start <= field <= end`
    #[must_use]
    pub fn between(mut self, field: &str, start: impl Into<Bson>, end: impl Into<Bson>) -> Self {
        let bounds: Vec<Bson> = vec![start.into(), end.into()];
        self.query
            .insert(format!("{}{}", field, Operator::Between.suffix()), bounds);
        self
    }

    /// `field` is absent
    #[must_use]
    pub fn is_null(mut self, field: &str) -> Self {
        self.query
            .insert(format!("{}{}", field, Operator::IsNull.suffix()), true);
        self
    }

    /// `field` is present
    #[must_use]
    pub fn is_not_null(mut self, field: &str) -> Self {
        self.query
            .insert(format!("{}{}", field, Operator::IsNotNull.suffix()), true);
        self
    }

    /// Insert a raw composite key, e.g. `add("age >", 18)`
    #[must_use]
    pub fn add(mut self, key: &str, value: impl Into<Bson>) -> Self {
        self.query.insert(key, value.into());
        self
    }

    /// [`Identifier::add`] only when `condition` holds
    #[must_use]
    pub fn add_if(self, condition: bool, key: &str, value: impl Into<Bson>) -> Self {
        if condition {
            self.add(key, value)
        } else {
            self
        }
    }

    /// Whether a composite key is present
    pub fn has(&self, key: &str) -> bool {
        self.query.contains_key(key)
    }

    /// Value stored under a composite key
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.query.get(key)
    }

    /// Whether any condition, with or without an operator, targets `field`
    ///
    /// ```rust
    /// use docwork::identifier::Identifier;
    ///
    /// let id = Identifier::new().is_not_null("deletedAt");
    /// assert!(id.references_field("deletedAt"));
    /// assert!(!id.has("deletedAt"));
    /// ```
    pub fn references_field(&self, field: &str) -> bool {
        self.query.keys().any(|key| parse_key(key).0 == field)
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.query.len()
    }

    /// True when no condition was added
    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }

    /// Copy of the raw composite-key mapping
    pub fn to_map(&self) -> Document {
        self.query.clone()
    }

    /// Render the native filter document
    ///
    /// Operator conditions on the same field merge into one operator document.
    /// An equality mixed with operator conditions on one field cannot share a
    /// key, so the later conditions are combined under `$and`.
    ///
    /// ```rust
    /// use bson::doc;
    /// use docwork::identifier::Identifier;
    ///
    /// let filter = Identifier::new()
    ///     .greater_than("age", 18)
    ///     .less_than("age", 65)
    ///     .to_filter();
    /// assert_eq!(filter, doc! { "age": { "$gt": 18, "$lt": 65 } });
    /// ```
    pub fn to_filter(&self) -> Document {
        let mut filter = Document::new();
        let mut conjuncts: Vec<Bson> = Vec::new();

        for (key, value) in &self.query {
            let (field, condition) = match parse_key(key) {
                (field, Some(op)) => match op.condition(value) {
                    Some(condition) => (field, Bson::Document(condition)),
                    None => continue,
                },
                (field, None) => (field, value.clone()),
            };

            match filter.get_mut(field) {
                None => {
                    filter.insert(field, condition);
                }
                Some(existing)
                    if is_operator_document(existing) && is_operator_document(&condition) =>
                {
                    if let (Bson::Document(target), Bson::Document(extra)) = (existing, condition)
                    {
                        for (op, operand) in extra {
                            target.insert(op, operand);
                        }
                    }
                }
                Some(_) => {
                    let mut clause = Document::new();
                    clause.insert(field, condition);
                    conjuncts.push(Bson::Document(clause));
                }
            }
        }

        if !conjuncts.is_empty() {
            filter.insert("$and", conjuncts);
        }
        filter
    }

    /// Read a stored value as an ObjectId
    ///
    /// ObjectId values pass through and hex strings are parsed.
    pub fn to_object_id(&self, field: &str) -> Result<ObjectId, RepositoryError> {
        match self.query.get(field) {
            None => Err(RepositoryError::new(
                RepositoryOperation::ResolveId,
                RepositoryErrorKind::NotFound,
                format!("field {} not found", field),
            )),
            Some(Bson::ObjectId(id)) => Ok(*id),
            Some(Bson::String(hex)) => ObjectId::parse_str(hex).map_err(|e| {
                RepositoryError::type_coercion_failed(format!(
                    "cannot parse {:?} as ObjectId: {}",
                    hex, e
                ))
            }),
            Some(other) => Err(RepositoryError::type_coercion_failed(format!(
                "cannot convert {:?} to ObjectId",
                other.element_type()
            ))),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.query.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                Bson::String(s) => write!(f, "{}: {}", key, s)?,
                other => write!(f, "{}: {}", key, other)?,
            }
        }
        write!(f, "}}")
    }
}

impl From<Identifier> for Document {
    fn from(identifier: Identifier) -> Self {
        identifier.to_filter()
    }
}

/// `_id == id`
pub fn by_id(id: impl Into<Bson>) -> Identifier {
    Identifier::new().equal("_id", id)
}

/// `slug == slug`
pub fn by_slug(slug: &str) -> Identifier {
    Identifier::new().equal("slug", slug)
}

/// `email == email`
pub fn by_email(email: &str) -> Identifier {
    Identifier::new().equal("email", email)
}

/// `active == true`
pub fn active() -> Identifier {
    Identifier::new().equal("active", true)
}

/// `active == false`
pub fn inactive() -> Identifier {
    Identifier::new().equal("active", false)
}

/// No deletion timestamp
pub fn not_deleted() -> Identifier {
    Identifier::new().is_null("deletedAt")
}

/// Deletion timestamp present
pub fn deleted() -> Identifier {
    Identifier::new().is_not_null("deletedAt")
}
