//! Generic repository over the Unit-of-Work factory
//!
//! [`BaseRepository`] forwards every call to a fresh [`UnitOfWork`] made by
//! its factory. Calls never share a session, so two calls are never part of
//! one transaction.
//!
//! [`UnitOfWork`]: crate::unit_of_work::UnitOfWork

use std::marker::PhantomData;

use bson::oid::ObjectId;

use super::pagination::QueryParams;
use super::traits::{Repository, RepositoryResult, SoftDeleteRepository};
use crate::domain::Entity;
use crate::factory::UnitOfWorkFactory;
use crate::identifier::Identifier;
use crate::store::DocumentStore;

/// Repository for any [`Entity`], one unit of work per call
pub struct BaseRepository<E, S: DocumentStore> {
    factory: UnitOfWorkFactory<S>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S: DocumentStore> Clone for BaseRepository<E, S> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E, S: DocumentStore> std::fmt::Debug for BaseRepository<E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseRepository")
            .field("entity", &crate::domain::entity_name::<E>())
            .field("backend", &self.factory.store().backend_name())
            .finish()
    }
}

impl<E: Entity, S: DocumentStore> BaseRepository<E, S> {
    pub fn new(factory: UnitOfWorkFactory<S>) -> Self {
        Self {
            factory,
            _entity: PhantomData,
        }
    }

    /// Factory the repository creates units of work with
    pub fn factory(&self) -> &UnitOfWorkFactory<S> {
        &self.factory
    }
}

impl<E: Entity, S: DocumentStore> Repository<E> for BaseRepository<E, S> {
    async fn insert(&self, entity: E) -> RepositoryResult<E> {
        self.factory.create::<E>().insert(entity).await
    }

    async fn update(&self, identifier: &Identifier, entity: E) -> RepositoryResult<E> {
        self.factory.create::<E>().update(identifier, entity).await
    }

    async fn delete(&self, identifier: &Identifier) -> RepositoryResult<()> {
        self.factory.create::<E>().delete(identifier).await
    }

    async fn find_one_by_id(&self, id: ObjectId) -> RepositoryResult<E> {
        self.factory.create::<E>().find_one_by_id(id).await
    }

    async fn find_one(&self, identifier: &Identifier) -> RepositoryResult<E> {
        self.factory
            .create::<E>()
            .find_one_by_identifier(identifier)
            .await
    }

    async fn find_all(&self, identifier: &Identifier) -> RepositoryResult<Vec<E>> {
        self.factory.create::<E>().find_many(identifier).await
    }

    async fn find_all_with_pagination(
        &self,
        params: &QueryParams<E>,
    ) -> RepositoryResult<(Vec<E>, u64)> {
        self.factory
            .create::<E>()
            .find_all_with_pagination(params)
            .await
    }

    async fn count(&self, identifier: &Identifier) -> RepositoryResult<u64> {
        self.factory.create::<E>().count(identifier).await
    }

    async fn bulk_insert(&self, entities: Vec<E>) -> RepositoryResult<Vec<E>> {
        self.factory.create::<E>().bulk_insert(entities).await
    }

    async fn bulk_update(&self, entities: Vec<E>) -> RepositoryResult<Vec<E>> {
        self.factory.create::<E>().bulk_update(entities).await
    }

    async fn bulk_delete(&self, identifiers: &[Identifier]) -> RepositoryResult<u64> {
        self.factory.create::<E>().bulk_hard_delete(identifiers).await
    }

    async fn ensure_unique_index(&self, field: &str) -> RepositoryResult<()> {
        self.factory.create::<E>().ensure_unique_index(field).await
    }
}

impl<E: Entity, S: DocumentStore> SoftDeleteRepository<E> for BaseRepository<E, S> {
    async fn soft_delete(&self, identifier: &Identifier) -> RepositoryResult<E> {
        self.factory.create::<E>().soft_delete(identifier).await
    }

    async fn bulk_soft_delete(&self, identifiers: &[Identifier]) -> RepositoryResult<u64> {
        self.factory.create::<E>().bulk_soft_delete(identifiers).await
    }

    async fn restore(&self, identifier: &Identifier) -> RepositoryResult<E> {
        self.factory.create::<E>().restore(identifier).await
    }

    async fn restore_all(&self) -> RepositoryResult<u64> {
        self.factory.create::<E>().restore_all().await
    }

    async fn get_trashed(&self) -> RepositoryResult<Vec<E>> {
        self.factory.create::<E>().get_trashed().await
    }

    async fn get_trashed_with_pagination(
        &self,
        params: &QueryParams<E>,
    ) -> RepositoryResult<(Vec<E>, u64)> {
        self.factory
            .create::<E>()
            .get_trashed_with_pagination(params)
            .await
    }
}
