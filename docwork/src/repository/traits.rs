//! Repository trait definitions
//!
//! This module provides generic traits for entity data access using RPITIT
//! (Return Position Impl Trait In Traits), available since Rust 1.75.
//!
//! # Overview
//!
//! - [`Repository`]: CRUD, finders, pagination and batched writes
//! - [`SoftDeleteRepository`]: soft delete, restore and trash queries
//!
//! Repositories do not expose transactions. Each call stands alone; multi-step
//! transactional work goes through a [`UnitOfWork`](crate::unit_of_work::UnitOfWork)
//! directly.

use std::future::Future;

use bson::oid::ObjectId;

use super::error::RepositoryError;
use super::pagination::QueryParams;
use crate::domain::Entity;
use crate::identifier::Identifier;

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Base repository trait for CRUD operations
///
/// Reads only return live entities unless the identifier targets
/// `deletedAt`. Lookups of a single entity fail with `NotFound` instead of
/// returning `None`.
///
/// # Example
///
/// ```rust
/// use docwork::identifier;
/// use docwork::models::User;
/// use docwork::repository::{BaseRepository, Repository};
/// use docwork::factory::UnitOfWorkFactory;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> docwork::repository::RepositoryResult<()> {
/// let repo = BaseRepository::<User, _>::new(UnitOfWorkFactory::in_memory());
///
/// repo.insert(User::new("ada@example.com", 36)).await?;
/// let ada = repo.find_one(&identifier::by_email("ada@example.com")).await?;
/// assert_eq!(ada.age, 36);
/// # Ok(())
/// # }
/// ```
pub trait Repository<E: Entity>: Send + Sync {
    /// Store a new entity, assigning its `_id` and timestamps
    fn insert(&self, entity: E) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Overwrite the first live match of `identifier` and return it
    fn update(
        &self,
        identifier: &Identifier,
        entity: E,
    ) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Permanently remove the first match of `identifier`
    fn delete(&self, identifier: &Identifier) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Live entity with the given `_id`
    fn find_one_by_id(&self, id: ObjectId) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// First entity matching `identifier`
    fn find_one(&self, identifier: &Identifier)
        -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Every entity matching `identifier`; an empty identifier matches all live entities
    fn find_all(
        &self,
        identifier: &Identifier,
    ) -> impl Future<Output = RepositoryResult<Vec<E>>> + Send;

    /// One page of live entities plus the total match count
    fn find_all_with_pagination(
        &self,
        params: &QueryParams<E>,
    ) -> impl Future<Output = RepositoryResult<(Vec<E>, u64)>> + Send;

    /// Number of entities matching `identifier`
    fn count(&self, identifier: &Identifier) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Store every entity in one unordered batch
    fn bulk_insert(&self, entities: Vec<E>)
        -> impl Future<Output = RepositoryResult<Vec<E>>> + Send;

    /// Overwrite every entity by `_id` in one unordered batch
    fn bulk_update(&self, entities: Vec<E>)
        -> impl Future<Output = RepositoryResult<Vec<E>>> + Send;

    /// Permanently remove the first match of each identifier; returns the removed count
    fn bulk_delete(
        &self,
        identifiers: &[Identifier],
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Enforce uniqueness of `field` at the store
    fn ensure_unique_index(&self, field: &str)
        -> impl Future<Output = RepositoryResult<()>> + Send;
}

/// Repository trait for entities with soft delete support
///
/// Soft-deleted entities keep their document with a `deletedAt` timestamp
/// and disappear from normal reads until restored.
pub trait SoftDeleteRepository<E: Entity>: Repository<E> {
    /// Mark the first live match of `identifier` as deleted and return it
    fn soft_delete(&self, identifier: &Identifier)
        -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Mark the first live match of each identifier as deleted; returns the marked count
    fn bulk_soft_delete(
        &self,
        identifiers: &[Identifier],
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Clear the deletion mark of the first trashed match of `identifier`
    ///
    /// Fails with `NotFoundInTrash` when nothing trashed matches.
    fn restore(&self, identifier: &Identifier) -> impl Future<Output = RepositoryResult<E>> + Send;

    /// Restore every trashed entity; returns the restored count
    fn restore_all(&self) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Every trashed entity
    fn get_trashed(&self) -> impl Future<Output = RepositoryResult<Vec<E>>> + Send;

    /// One page of trashed entities plus the total match count
    fn get_trashed_with_pagination(
        &self,
        params: &QueryParams<E>,
    ) -> impl Future<Output = RepositoryResult<(Vec<E>, u64)>> + Send;
}
