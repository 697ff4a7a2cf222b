//! Filter, update and sort evaluation over in-memory documents
//!
//! Supports the query subset the unit of work emits: equality (a null
//! operand also matches a missing field), `$eq`, `$ne`, `$gt`, `$gte`, `$lt`,
//! `$lte`, `$in`, `$nin`, `$regex` with `$options`, `$exists`, `$and` and
//! `$or`. Updates support `$set` and `$unset`.

use bson::{Bson, Document};
use regex::RegexBuilder;
use std::cmp::Ordering;

use crate::error::{DatabaseError, DatabaseOperation};

use super::StoreResult;

fn unsupported(operation: DatabaseOperation, what: &str) -> DatabaseError {
    DatabaseError::new(
        operation,
        crate::error::DatabaseErrorKind::QueryFailed,
        format!("unsupported {}", what),
    )
}

/// Resolve a possibly dotted path
fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Ordering between two values of comparable types
fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => Some((x.time, x.increment).cmp(&(y.time, y.increment))),
        _ => None,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Equality as a query sees it: arrays match if any element matches
fn field_equals(value: Option<&Bson>, operand: &Bson) -> bool {
    match (value, operand) {
        (None, Bson::Null) => true,
        (None, _) => false,
        (Some(Bson::Array(items)), operand) if !matches!(operand, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, operand))
        }
        (Some(value), operand) => values_equal(value, operand),
    }
}

fn field_compare(value: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    match value {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare(item, operand).map(accept).unwrap_or(false)),
        Some(value) => compare(value, operand).map(accept).unwrap_or(false),
        None => false,
    }
}

fn is_operator_document(value: &Bson) -> bool {
    matches!(value, Bson::Document(doc) if !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')))
}

fn regex_matches(value: Option<&Bson>, pattern: &Bson, options: Option<&Bson>) -> StoreResult<bool> {
    let (pattern, mut flags) = match pattern {
        Bson::String(p) => (p.as_str(), String::new()),
        Bson::RegularExpression(re) => (re.pattern.as_str(), re.options.clone()),
        _ => return Err(unsupported(DatabaseOperation::Query, "$regex operand")),
    };
    if let Some(Bson::String(extra)) = options {
        flags.push_str(extra);
    }
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|e| DatabaseError::query_failed(format!("invalid $regex: {}", e)))?;

    Ok(match value {
        Some(Bson::String(s)) => regex.is_match(s),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(s) if regex.is_match(s))),
        _ => false,
    })
}

fn operators_match(value: Option<&Bson>, operators: &Document) -> StoreResult<bool> {
    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$eq" => field_equals(value, operand),
            "$ne" => !field_equals(value, operand),
            "$gt" => field_compare(value, operand, |o| o == Ordering::Greater),
            "$gte" => field_compare(value, operand, |o| o != Ordering::Less),
            "$lt" => field_compare(value, operand, |o| o == Ordering::Less),
            "$lte" => field_compare(value, operand, |o| o != Ordering::Greater),
            "$in" | "$nin" => {
                let Bson::Array(candidates) = operand else {
                    return Err(DatabaseError::query_failed(format!("{} needs an array", op)));
                };
                let found = candidates.iter().any(|c| field_equals(value, c));
                if op == "$in" {
                    found
                } else {
                    !found
                }
            }
            "$exists" => {
                let wanted = match operand {
                    Bson::Boolean(b) => *b,
                    other => as_f64(other).map(|n| n != 0.0).unwrap_or(true),
                };
                value.is_some() == wanted
            }
            "$regex" => regex_matches(value, operand, operators.get("$options"))?,
            "$options" => true,
            other => return Err(unsupported(DatabaseOperation::Query, &format!("operator {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses(operand: &Bson, op: &str) -> StoreResult<Vec<Document>> {
    match operand {
        Bson::Array(items) => items
            .iter()
            .map(|item| match item {
                Bson::Document(doc) => Ok(doc.clone()),
                _ => Err(DatabaseError::query_failed(format!("{} needs documents", op))),
            })
            .collect(),
        _ => Err(DatabaseError::query_failed(format!("{} needs an array", op))),
    }
}

/// Whether `doc` satisfies `filter`
pub(crate) fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(condition, "$and")? {
                    if !matches(doc, &clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(condition, "$or")? {
                    if matches(doc, &clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(unsupported(DatabaseOperation::Query, &format!("operator {}", op)))
            }
            field => {
                let value = lookup(doc, field);
                match condition {
                    Bson::Document(ops) if is_operator_document(condition) => {
                        operators_match(value, ops)?
                    }
                    operand => field_equals(value, operand),
                }
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Apply `$set` / `$unset` to `doc`; returns whether anything changed
pub(crate) fn apply_update(doc: &mut Document, update: &Document) -> StoreResult<bool> {
    let mut changed = false;
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(DatabaseError::query_failed(format!("{} needs a document", op)));
        };
        match op.as_str() {
            "$set" => {
                for (field, value) in fields {
                    if field == "_id" && doc.get("_id").is_some_and(|id| id != value) {
                        return Err(DatabaseError::query_failed("_id is immutable"));
                    }
                    if doc.get(field) != Some(value) {
                        doc.insert(field.clone(), value.clone());
                        changed = true;
                    }
                }
            }
            "$unset" => {
                for (field, _) in fields {
                    if doc.remove(field).is_some() {
                        changed = true;
                    }
                }
            }
            other => {
                return Err(unsupported(DatabaseOperation::Update, &format!("update operator {}", other)))
            }
        }
    }
    Ok(changed)
}

/// Rank used to order values of different types (missing sorts first)
fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) => 0,
        Some(Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => 1,
        Some(Bson::String(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::ObjectId(_)) => 5,
        Some(Bson::Boolean(_)) => 6,
        Some(Bson::DateTime(_)) => 7,
        Some(Bson::Timestamp(_)) => 8,
        Some(_) => 9,
    }
}

fn compare_field(a: &Document, b: &Document, field: &str) -> Ordering {
    let (x, y) = (lookup(a, field), lookup(b, field));
    match (x, y) {
        (Some(x), Some(y)) => compare(x, y).unwrap_or_else(|| type_rank(Some(x)).cmp(&type_rank(Some(y)))),
        _ => type_rank(x).cmp(&type_rank(y)),
    }
}

/// Stable multi-key sort by a native sort document
pub(crate) fn sort_documents(docs: &mut [Document], sort: &Document) {
    let keys: Vec<(String, bool)> = sort
        .iter()
        .map(|(field, direction)| {
            let descending = as_f64(direction).map(|d| d < 0.0).unwrap_or(false);
            (field.clone(), descending)
        })
        .collect();

    docs.sort_by(|a, b| {
        for (field, descending) in &keys {
            let ordering = compare_field(a, b, field);
            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    fn check(doc: &Document, filter: Document) -> bool {
        matches(doc, &filter).unwrap()
    }

    #[test]
    fn test_equality_and_null() {
        let d = doc! { "name": "a", "age": 30 };
        assert!(check(&d, doc! { "name": "a" }));
        assert!(!check(&d, doc! { "name": "b" }));
        assert!(check(&d, doc! { "missing": Bson::Null }));
        assert!(check(&d, doc! { "age": 30.0 }));
        assert!(check(&d, doc! { "age": 30_i64 }));
    }

    #[test]
    fn test_comparisons_across_numeric_types() {
        let d = doc! { "price": 19.99, "qty": 5_i64 };
        assert!(check(&d, doc! { "price": { "$gt": 10 } }));
        assert!(check(&d, doc! { "price": { "$gte": 10.0, "$lte": 20.0 } }));
        assert!(!check(&d, doc! { "price": { "$lt": 19.99 } }));
        assert!(check(&d, doc! { "qty": { "$lte": 5 } }));
        assert!(!check(&d, doc! { "qty": { "$gt": "4" } }));
    }

    #[test]
    fn test_exists() {
        let d = doc! { "deletedAt": bson::DateTime::now() };
        assert!(check(&d, doc! { "deletedAt": { "$exists": true } }));
        assert!(!check(&d, doc! { "deletedAt": { "$exists": false } }));
        assert!(check(&doc! {}, doc! { "deletedAt": { "$exists": false } }));
    }

    #[test]
    fn test_in_and_nin() {
        let d = doc! { "category": "books" };
        assert!(check(&d, doc! { "category": { "$in": ["books", "games"] } }));
        assert!(!check(&d, doc! { "category": { "$nin": ["books"] } }));
        assert!(matches(&d, &doc! { "category": { "$in": "books" } }).is_err());
    }

    #[test]
    fn test_regex_with_options() {
        let d = doc! { "name": "Mechanical Keyboard" };
        assert!(check(&d, doc! { "name": { "$regex": "keyboard", "$options": "i" } }));
        assert!(!check(&d, doc! { "name": { "$regex": "keyboard" } }));
        assert!(matches(&d, &doc! { "name": { "$regex": "(" } }).is_err());
    }

    #[test]
    fn test_and_or() {
        let d = doc! { "age": 30, "active": true };
        assert!(check(
            &d,
            doc! { "age": 30, "$and": [ { "age": { "$gt": 18 } }, { "active": true } ] }
        ));
        assert!(check(&d, doc! { "$or": [ { "age": 1 }, { "active": true } ] }));
        assert!(!check(&d, doc! { "$or": [ { "age": 1 }, { "active": false } ] }));
    }

    #[test]
    fn test_array_field_matches_any_element() {
        let d = doc! { "tags": ["a", "b"] };
        assert!(check(&d, doc! { "tags": "b" }));
        assert!(check(&d, doc! { "tags": ["a", "b"] }));
    }

    #[test]
    fn test_dotted_path() {
        let d = doc! { "address": { "city": "Oslo" } };
        assert!(check(&d, doc! { "address.city": "Oslo" }));
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let d = doc! { "a": 1 };
        assert!(matches(&d, &doc! { "a": { "$near": 1 } }).is_err());
        assert!(matches(&d, &doc! { "$where": "true" }).is_err());
    }

    #[test]
    fn test_apply_update_set_and_unset() {
        let mut d = doc! { "_id": ObjectId::new(), "name": "a", "deletedAt": 1 };
        let changed = apply_update(
            &mut d,
            &doc! { "$set": { "name": "b" }, "$unset": { "deletedAt": "" } },
        )
        .unwrap();
        assert!(changed);
        assert_eq!(d.get_str("name").unwrap(), "b");
        assert!(!d.contains_key("deletedAt"));

        let unchanged = apply_update(&mut d, &doc! { "$set": { "name": "b" } }).unwrap();
        assert!(!unchanged);
    }

    #[test]
    fn test_apply_update_rejects_id_change() {
        let mut d = doc! { "_id": ObjectId::new() };
        assert!(apply_update(&mut d, &doc! { "$set": { "_id": ObjectId::new() } }).is_err());
        assert!(apply_update(&mut d, &doc! { "$inc": { "n": 1 } }).is_err());
    }

    #[test]
    fn test_sort_documents_multi_key() {
        let mut docs = vec![
            doc! { "cat": "b", "price": 1 },
            doc! { "cat": "a", "price": 5 },
            doc! { "cat": "a", "price": 9 },
            doc! { "price": 0 },
        ];
        sort_documents(&mut docs, &doc! { "cat": 1, "price": -1 });
        let prices: Vec<i32> = docs.iter().map(|d| d.get_i32("price").unwrap()).collect();
        assert_eq!(prices, vec![0, 9, 5, 1]);
    }
}
