//! In-memory document store
//!
//! Collections are vectors of BSON documents behind one async read-write
//! lock. Every query is a linear scan through the evaluator.
//!
//! Sessions stage a private copy of each collection they touch. Reads inside
//! a session see its staged writes; commit publishes the touched collections.
//! Every collection carries a version bumped on each published write. A commit
//! fails with `TransactionFailed` when any collection it staged has moved on
//! since staging, and nothing is published. Abort discards the copies.
//!
//! Unique indexes are checked on insert and update. `_id` is always unique.
//! Documents missing an indexed field are not checked against each other.

use async_trait::async_trait;
use bson::{Bson, Document};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::evaluator::{apply_update, matches, sort_documents};
use super::{BulkWriteOutcome, DocumentStore, FindOptions, StoreResult, UpdateOutcome, WriteModel};
use crate::error::{DatabaseError, DatabaseOperation};

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, Vec<Document>>,
    unique: HashMap<String, BTreeSet<String>>,
    versions: HashMap<String, u64>,
}

impl State {
    fn version(&self, collection: &str) -> u64 {
        self.versions.get(collection).copied().unwrap_or_default()
    }

    fn bump(&mut self, collection: &str) {
        *self.versions.entry(collection.to_string()).or_default() += 1;
    }
}

/// Transaction state for [`InMemoryStore`]
#[derive(Debug)]
pub struct MemorySession {
    id: u64,
    staged: HashMap<String, Vec<Document>>,
    // collection version observed when it was staged
    staged_at: HashMap<String, u64>,
}

impl MemorySession {
    /// Session number, unique per store
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Document store kept in process memory
///
/// Cloning shares the underlying data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    next_session: Arc<AtomicU64>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of collections holding at least one document
    pub async fn collection_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state
            .collections
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Run a read against the session's copy or the shared collection
    async fn read<R>(
        &self,
        session: Option<&mut MemorySession>,
        collection: &str,
        f: impl FnOnce(&[Document]) -> StoreResult<R>,
    ) -> StoreResult<R> {
        if let Some(docs) = session.as_deref().and_then(|s| s.staged.get(collection)) {
            return f(docs);
        }
        let state = self.state.read().await;
        let docs = state
            .collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        f(docs)
    }

    /// Run a write against the session's copy or the shared collection
    async fn write<R>(
        &self,
        session: Option<&mut MemorySession>,
        collection: &str,
        f: impl FnOnce(&mut Vec<Document>, &BTreeSet<String>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        match session {
            Some(session) => {
                let unique = {
                    let state = self.state.read().await;
                    if !session.staged.contains_key(collection) {
                        let copy = state.collections.get(collection).cloned().unwrap_or_default();
                        session.staged.insert(collection.to_string(), copy);
                        session
                            .staged_at
                            .insert(collection.to_string(), state.version(collection));
                    }
                    state.unique.get(collection).cloned().unwrap_or_default()
                };
                let docs = session.staged.entry(collection.to_string()).or_default();
                f(docs, &unique)
            }
            None => {
                let mut guard = self.state.write().await;
                let state = &mut *guard;
                let unique = state.unique.get(collection).cloned().unwrap_or_default();
                state.bump(collection);
                let docs = state.collections.entry(collection.to_string()).or_default();
                f(docs, &unique)
            }
        }
    }
}

/// Reject `candidate` if it repeats `_id` or a unique field of another document
fn check_unique(
    docs: &[Document],
    skip: Option<usize>,
    candidate: &Document,
    unique: &BTreeSet<String>,
    operation: DatabaseOperation,
) -> StoreResult<()> {
    let fields = std::iter::once("_id").chain(unique.iter().map(String::as_str));
    for field in fields {
        let Some(value) = candidate.get(field).filter(|v| !matches!(v, Bson::Null)) else {
            continue;
        };
        let clash = docs
            .iter()
            .enumerate()
            .any(|(i, doc)| Some(i) != skip && doc.get(field) == Some(value));
        if clash {
            return Err(DatabaseError::with_context(
                operation,
                crate::error::DatabaseErrorKind::ConstraintViolation,
                format!("E11000 duplicate key error: {} {}", field, value),
                field,
            ));
        }
    }
    Ok(())
}

fn require_id(document: &Document) -> StoreResult<()> {
    if document.contains_key("_id") {
        Ok(())
    } else {
        Err(DatabaseError::query_failed("document has no _id").add_context("insert"))
    }
}

fn insert_checked(
    docs: &mut Vec<Document>,
    unique: &BTreeSet<String>,
    document: Document,
) -> StoreResult<()> {
    require_id(&document)?;
    check_unique(docs, None, &document, unique, DatabaseOperation::Insert)?;
    docs.push(document);
    Ok(())
}

fn position(docs: &[Document], filter: &Document) -> StoreResult<Option<usize>> {
    for (i, doc) in docs.iter().enumerate() {
        if matches(doc, filter)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// Update the document at `index`; returns whether it changed
fn update_at(
    docs: &mut [Document],
    index: usize,
    update: &Document,
    unique: &BTreeSet<String>,
) -> StoreResult<bool> {
    let mut candidate = docs[index].clone();
    let changed = apply_update(&mut candidate, update)?;
    if changed {
        check_unique(docs, Some(index), &candidate, unique, DatabaseOperation::Update)?;
        docs[index] = candidate;
    }
    Ok(changed)
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    type Session = MemorySession;

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn start_session(&self) -> StoreResult<MemorySession> {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(session = id, "Started in-memory session");
        Ok(MemorySession {
            id,
            staged: HashMap::new(),
            staged_at: HashMap::new(),
        })
    }

    async fn commit_session(&self, session: MemorySession) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let conflict = session
            .staged_at
            .iter()
            .find(|(name, seen)| state.version(name) != **seen);
        if let Some((name, _)) = conflict {
            debug!(session = session.id, collection = %name, "In-memory commit conflict");
            return Err(DatabaseError::transaction_failed(format!(
                "write conflict: collection {} changed outside the transaction",
                name
            ))
            .add_context(name.as_str()));
        }

        let touched = session.staged.len();
        for (name, docs) in session.staged {
            state.bump(&name);
            state.collections.insert(name, docs);
        }
        debug!(session = session.id, touched, "Committed in-memory session");
        Ok(())
    }

    async fn abort_session(&self, session: MemorySession) -> StoreResult<()> {
        debug!(session = session.id, "Aborted in-memory session");
        Ok(())
    }

    async fn find(
        &self,
        session: Option<&mut MemorySession>,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let mut found = self
            .read(session, collection, |docs| {
                let mut found = Vec::new();
                for doc in docs {
                    if matches(doc, &filter)? {
                        found.push(doc.clone());
                    }
                }
                Ok(found)
            })
            .await?;

        if let Some(sort) = &options.sort {
            sort_documents(&mut found, sort);
        }
        let skip = usize::try_from(options.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = match options.limit {
            Some(n) if n > 0 => usize::try_from(n).unwrap_or(usize::MAX),
            _ => usize::MAX,
        };
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn find_one(
        &self,
        session: Option<&mut MemorySession>,
        collection: &str,
        filter: Document,
    ) -> StoreResult<Option<Document>> {
        self.read(session, collection, |docs| {
            Ok(position(docs, &filter)?.map(|i| docs[i].clone()))
        })
        .await
    }

    async fn count(
        &self,
        session: Option<&mut MemorySession>,
        collection: &str,
        filter: Document,
    ) -> StoreResult<u64> {
        self.read(session, collection, |docs| {
            let mut count = 0;
            for doc in docs {
                if matches(doc, &filter)? {
                    count += 1;
                }
            }
            Ok(count)
        })
        .await
    }

    async fn insert_one(
        &self,
        session: Option<&mut MemorySession>,
        collection: &str,
        document: Document,
    ) -> StoreResult<()> {
        self.write(session, collection, |docs, unique| {
            insert_checked(docs, unique, document)
        })
        .await
    }

    async fn insert_many(
        &self,
        session: Option<&mut MemorySession>,
        collection: &str,
        documents: Vec<Document>,
    ) -> StoreResult<u64> {
        self.write(session, collection, |docs, unique| {
            let mut inserted = 0;
            let mut first_error = None;
            for document in documents {
                match insert_checked(docs, unique, document) {
                    Ok(()) => inserted += 1,
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            match first_error {
                Some(e) => Err(e.add_context(format!("{} documents inserted", inserted))),
                None => Ok(inserted),
            }
        })
        .await
    }

    async fn find_one_and_update(
        &self,
        session: Option<&mut MemorySession>,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<Option<Document>> {
        self.write(session, collection, |docs, unique| {
            let Some(index) = position(docs, &filter)? else {
                return Ok(None);
            };
            update_at(docs, index, &update, unique)?;
            Ok(Some(docs[index].clone()))
        })
        .await
    }

    async fn find_one_and_delete(
        &self,
        session: Option<&mut MemorySession>,
        collection: &str,
        filter: Document,
    ) -> StoreResult<Option<Document>> {
        self.write(session, collection, |docs, _| {
            Ok(position(docs, &filter)?.map(|index| docs.remove(index)))
        })
        .await
    }

    async fn delete_one(
        &self,
        session: Option<&mut MemorySession>,
        collection: &str,
        filter: Document,
    ) -> StoreResult<u64> {
        self.write(session, collection, |docs, _| {
            Ok(match position(docs, &filter)? {
                Some(index) => {
                    docs.remove(index);
                    1
                }
                None => 0,
            })
        })
        .await
    }

    async fn update_many(
        &self,
        session: Option<&mut MemorySession>,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<UpdateOutcome> {
        self.write(session, collection, |docs, unique| {
            let mut outcome = UpdateOutcome::default();
            for index in 0..docs.len() {
                if matches(&docs[index], &filter)? {
                    outcome.matched += 1;
                    if update_at(docs, index, &update, unique)? {
                        outcome.modified += 1;
                    }
                }
            }
            Ok(outcome)
        })
        .await
    }

    async fn bulk_write(
        &self,
        session: Option<&mut MemorySession>,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> StoreResult<BulkWriteOutcome> {
        let count = models.len();
        let outcome = self
            .write(session, collection, |docs, unique| {
                let mut outcome = BulkWriteOutcome::default();
                let mut first_error = None;
                for model in models {
                    let result = match model {
                        WriteModel::InsertOne { document } => {
                            insert_checked(docs, unique, document).map(|()| outcome.inserted += 1)
                        }
                        WriteModel::UpdateOne { filter, update } => match position(docs, &filter) {
                            Ok(Some(index)) => {
                                outcome.matched += 1;
                                update_at(docs, index, &update, unique)
                                    .map(|changed| outcome.modified += u64::from(changed))
                            }
                            Ok(None) => Ok(()),
                            Err(e) => Err(e),
                        },
                        WriteModel::DeleteOne { filter } => match position(docs, &filter) {
                            Ok(Some(index)) => {
                                docs.remove(index);
                                outcome.deleted += 1;
                                Ok(())
                            }
                            Ok(None) => Ok(()),
                            Err(e) => Err(e),
                        },
                    };
                    if let Err(e) = result {
                        first_error.get_or_insert(e);
                    }
                }
                match first_error {
                    Some(e) => Err(DatabaseError {
                        operation: DatabaseOperation::BulkWrite,
                        ..e
                    }),
                    None => Ok(outcome),
                }
            })
            .await?;
        debug!(collection, models = count, ?outcome, "In-memory bulk write");
        Ok(outcome)
    }

    async fn create_unique_index(&self, collection: &str, field: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(docs) = state.collections.get(collection) {
            let mut seen: Vec<&Bson> = Vec::new();
            for value in docs.iter().filter_map(|d| d.get(field)) {
                if seen.contains(&value) {
                    return Err(DatabaseError::with_context(
                        DatabaseOperation::Index,
                        crate::error::DatabaseErrorKind::ConstraintViolation,
                        format!("E11000 duplicate key error: existing {} {}", field, value),
                        field,
                    ));
                }
                seen.push(value);
            }
        }
        state
            .unique
            .entry(collection.to_string())
            .or_default()
            .insert(field.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseErrorKind;
    use bson::{doc, oid::ObjectId};

    fn person(name: &str, age: i32) -> Document {
        doc! { "_id": ObjectId::new(), "name": name, "age": age }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryStore::new();
        store.insert_one(None, "people", person("ann", 30)).await.unwrap();
        store.insert_one(None, "people", person("bob", 20)).await.unwrap();

        let found = store
            .find(
                None,
                "people",
                doc! { "age": { "$gt": 25 } },
                FindOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get_str("name").unwrap(), "ann");
        assert_eq!(store.collection_names().await, vec!["people".to_string()]);
    }

    #[tokio::test]
    async fn test_find_sort_skip_limit() {
        let store = InMemoryStore::new();
        let docs = (1..=5).map(|i| person(&format!("p{}", i), i)).collect();
        store.insert_many(None, "people", docs).await.unwrap();

        let options = FindOptions {
            sort: Some(doc! { "age": -1 }),
            skip: Some(1),
            limit: Some(2),
        };
        let found = store.find(None, "people", doc! {}, options).await.unwrap();
        let ages: Vec<i32> = found.iter().map(|d| d.get_i32("age").unwrap()).collect();
        assert_eq!(ages, vec![4, 3]);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = InMemoryStore::new();
        let doc = person("ann", 30);
        store.insert_one(None, "people", doc.clone()).await.unwrap();
        let err = store.insert_one(None, "people", doc).await.unwrap_err();
        assert_eq!(err.kind, DatabaseErrorKind::ConstraintViolation);
    }

    #[tokio::test]
    async fn test_insert_without_id_rejected() {
        let store = InMemoryStore::new();
        let err = store
            .insert_one(None, "people", doc! { "name": "x" })
            .await
            .unwrap_err();
        assert_eq!(err.kind, DatabaseErrorKind::QueryFailed);
    }

    #[tokio::test]
    async fn test_unique_index_on_insert_and_update() {
        let store = InMemoryStore::new();
        store.create_unique_index("users", "email").await.unwrap();

        let a = doc! { "_id": ObjectId::new(), "email": "a@x.io" };
        let b = doc! { "_id": ObjectId::new(), "email": "b@x.io" };
        store.insert_one(None, "users", a).await.unwrap();
        store.insert_one(None, "users", b).await.unwrap();

        let dup = doc! { "_id": ObjectId::new(), "email": "a@x.io" };
        let err = store.insert_one(None, "users", dup).await.unwrap_err();
        assert_eq!(err.kind, DatabaseErrorKind::ConstraintViolation);

        let err = store
            .find_one_and_update(
                None,
                "users",
                doc! { "email": "b@x.io" },
                doc! { "$set": { "email": "a@x.io" } },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, DatabaseErrorKind::ConstraintViolation);

        let unchanged = store
            .find_one(None, "users", doc! { "email": "b@x.io" })
            .await
            .unwrap();
        assert!(unchanged.is_some());
    }

    #[tokio::test]
    async fn test_unique_index_fails_on_existing_duplicates() {
        let store = InMemoryStore::new();
        store
            .insert_many(
                None,
                "users",
                vec![
                    doc! { "_id": 1, "email": "a" },
                    doc! { "_id": 2, "email": "a" },
                ],
            )
            .await
            .unwrap();
        assert!(store.create_unique_index("users", "email").await.is_err());
    }

    #[tokio::test]
    async fn test_insert_many_is_unordered() {
        let store = InMemoryStore::new();
        let first = person("a", 1);
        let batch = vec![first.clone(), first, person("b", 2)];
        let err = store.insert_many(None, "people", batch).await.unwrap_err();
        assert_eq!(err.kind, DatabaseErrorKind::ConstraintViolation);
        assert_eq!(store.count(None, "people", doc! {}).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_one_and_update_returns_after() {
        let store = InMemoryStore::new();
        store.insert_one(None, "people", person("ann", 30)).await.unwrap();
        let updated = store
            .find_one_and_update(
                None,
                "people",
                doc! { "name": "ann" },
                doc! { "$set": { "age": 31 } },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.get_i32("age").unwrap(), 31);

        let missing = store
            .find_one_and_update(None, "people", doc! { "name": "zed" }, doc! { "$set": { "age": 1 } })
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_deletes() {
        let store = InMemoryStore::new();
        store.insert_one(None, "people", person("ann", 30)).await.unwrap();
        store.insert_one(None, "people", person("bob", 20)).await.unwrap();

        let removed = store
            .find_one_and_delete(None, "people", doc! { "name": "ann" })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed.get_str("name").unwrap(), "ann");
        assert_eq!(store.delete_one(None, "people", doc! { "name": "bob" }).await.unwrap(), 1);
        assert_eq!(store.delete_one(None, "people", doc! { "name": "bob" }).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_many_counts() {
        let store = InMemoryStore::new();
        store
            .insert_many(None, "people", vec![person("a", 1), person("b", 1), person("c", 2)])
            .await
            .unwrap();
        let outcome = store
            .update_many(None, "people", doc! { "age": 1 }, doc! { "$set": { "age": 2 } })
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 2, modified: 2 });
    }

    #[tokio::test]
    async fn test_bulk_write_counts() {
        let store = InMemoryStore::new();
        let ann = person("ann", 30);
        let ann_id = ann.get_object_id("_id").unwrap();
        store.insert_one(None, "people", ann).await.unwrap();

        let outcome = store
            .bulk_write(
                None,
                "people",
                vec![
                    WriteModel::InsertOne { document: person("bob", 20) },
                    WriteModel::UpdateOne {
                        filter: doc! { "_id": ann_id },
                        update: doc! { "$set": { "age": 31 } },
                    },
                    WriteModel::UpdateOne {
                        filter: doc! { "_id": ObjectId::new() },
                        update: doc! { "$set": { "age": 99 } },
                    },
                    WriteModel::DeleteOne { filter: doc! { "name": "bob" } },
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            BulkWriteOutcome { inserted: 1, matched: 1, modified: 1, deleted: 1 }
        );
    }

    #[tokio::test]
    async fn test_session_commit_publishes() {
        let store = InMemoryStore::new();
        let mut session = store.start_session().await.unwrap();
        store
            .insert_one(Some(&mut session), "people", person("ann", 30))
            .await
            .unwrap();

        // Visible inside the session only
        assert_eq!(store.count(Some(&mut session), "people", doc! {}).await.unwrap(), 1);
        assert_eq!(store.count(None, "people", doc! {}).await.unwrap(), 0);

        store.commit_session(session).await.unwrap();
        assert_eq!(store.count(None, "people", doc! {}).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_session_abort_discards() {
        let store = InMemoryStore::new();
        store.insert_one(None, "people", person("ann", 30)).await.unwrap();

        let mut session = store.start_session().await.unwrap();
        store
            .delete_one(Some(&mut session), "people", doc! { "name": "ann" })
            .await
            .unwrap();
        store.abort_session(session).await.unwrap();

        assert_eq!(store.count(None, "people", doc! {}).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_session_commit_conflicts_with_outside_write() {
        let store = InMemoryStore::new();
        let mut session = store.start_session().await.unwrap();
        store
            .insert_one(Some(&mut session), "people", person("in", 30))
            .await
            .unwrap();
        store.insert_one(None, "people", person("out", 40)).await.unwrap();

        let err = store.commit_session(session).await.unwrap_err();
        assert_eq!(err.kind, DatabaseErrorKind::TransactionFailed);

        // The outside write survives and nothing from the session leaks
        let names: Vec<_> = store
            .find(None, "people", doc! {}, FindOptions::default())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.get_str("name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["out".to_string()]);
    }

    #[tokio::test]
    async fn test_session_commit_ignores_other_collections() {
        let store = InMemoryStore::new();
        let mut session = store.start_session().await.unwrap();
        store
            .insert_one(Some(&mut session), "people", person("in", 30))
            .await
            .unwrap();
        store.insert_one(None, "pets", person("rex", 3)).await.unwrap();

        store.commit_session(session).await.unwrap();
        assert_eq!(store.count(None, "people", doc! {}).await.unwrap(), 1);
        assert_eq!(store.count(None, "pets", doc! {}).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_session_ids_increase() {
        let store = InMemoryStore::new();
        let a = store.start_session().await.unwrap();
        let b = store.start_session().await.unwrap();
        assert!(b.id() > a.id());
    }
}
