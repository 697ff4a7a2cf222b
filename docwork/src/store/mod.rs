//! Document store abstraction and backend implementations
//!
//! The [`DocumentStore`] trait is the seam between the unit of work and the
//! database driver. Every data method takes the collection name and an
//! optional session; passing a session runs the operation inside that
//! session's transaction.
//!
//! # Available Backends
//!
//! - **In-memory** (always available): [`InMemoryStore`], collections of
//!   documents behind an async lock, for tests and demos
//! - **MongoDB** (`mongodb` feature): `MongoStore`, built on the official driver

use async_trait::async_trait;
use bson::Document;

use crate::error::DatabaseError;

mod evaluator;
pub mod memory;

#[cfg(feature = "mongodb")]
pub mod mongo;

pub use memory::{InMemoryStore, MemorySession};

#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, DatabaseError>;

/// Sort, skip and limit for [`DocumentStore::find`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Native sort document (`{field: 1 | -1}`)
    pub sort: Option<Document>,
    /// Documents to skip
    pub skip: Option<u64>,
    /// Maximum documents to return; `None` for no limit
    pub limit: Option<i64>,
}

/// One write in an unordered batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    /// Insert a document
    InsertOne { document: Document },
    /// Apply an update document to the first match
    UpdateOne { filter: Document, update: Document },
    /// Delete the first match
    DeleteOne { filter: Document },
}

/// Aggregate counts reported by [`DocumentStore::bulk_write`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteOutcome {
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub deleted: u64,
}

/// Counts reported by [`DocumentStore::update_many`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// Trait for document database backends
///
/// Sessions carry an open transaction: [`DocumentStore::start_session`]
/// starts both, [`DocumentStore::commit_session`] and
/// [`DocumentStore::abort_session`] end both.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// A session with a started transaction
    type Session: Send + 'static;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Round-trip to the server
    async fn ping(&self) -> StoreResult<()>;

    /// Start a session and a transaction on it
    async fn start_session(&self) -> StoreResult<Self::Session>;

    /// Commit the session's transaction and end the session
    async fn commit_session(&self, session: Self::Session) -> StoreResult<()>;

    /// Abort the session's transaction and end the session
    async fn abort_session(&self, session: Self::Session) -> StoreResult<()>;

    /// All documents matching `filter`
    async fn find(
        &self,
        session: Option<&mut Self::Session>,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> StoreResult<Vec<Document>>;

    /// First document matching `filter`
    async fn find_one(
        &self,
        session: Option<&mut Self::Session>,
        collection: &str,
        filter: Document,
    ) -> StoreResult<Option<Document>>;

    /// Number of documents matching `filter`
    async fn count(
        &self,
        session: Option<&mut Self::Session>,
        collection: &str,
        filter: Document,
    ) -> StoreResult<u64>;

    /// Insert one document; it must carry an `_id`
    async fn insert_one(
        &self,
        session: Option<&mut Self::Session>,
        collection: &str,
        document: Document,
    ) -> StoreResult<()>;

    /// Unordered insert; returns how many documents were written
    ///
    /// A failing document does not stop the others; the first failure is
    /// reported after the batch ran.
    async fn insert_many(
        &self,
        session: Option<&mut Self::Session>,
        collection: &str,
        documents: Vec<Document>,
    ) -> StoreResult<u64>;

    /// Update the first match and return it as it is after the update
    async fn find_one_and_update(
        &self,
        session: Option<&mut Self::Session>,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<Option<Document>>;

    /// Delete the first match and return it
    async fn find_one_and_delete(
        &self,
        session: Option<&mut Self::Session>,
        collection: &str,
        filter: Document,
    ) -> StoreResult<Option<Document>>;

    /// Delete the first match; returns the deleted count
    async fn delete_one(
        &self,
        session: Option<&mut Self::Session>,
        collection: &str,
        filter: Document,
    ) -> StoreResult<u64>;

    /// Apply `update` to every match
    async fn update_many(
        &self,
        session: Option<&mut Self::Session>,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<UpdateOutcome>;

    /// Unordered batch of writes against one collection
    async fn bulk_write(
        &self,
        session: Option<&mut Self::Session>,
        collection: &str,
        models: Vec<WriteModel>,
    ) -> StoreResult<BulkWriteOutcome>;

    /// Enforce uniqueness of `field` across the collection
    async fn create_unique_index(&self, collection: &str, field: &str) -> StoreResult<()>;
}
