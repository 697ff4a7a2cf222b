//! Unit of Work over a single entity type
//!
//! A [`UnitOfWork`] binds one entity type to its collection and a shared
//! [`DocumentStore`]. It owns an optional session: while a transaction is
//! open every operation runs inside it, otherwise operations run directly
//! against the store.
//!
//! Reads only see live documents (no `deletedAt`) unless the caller's
//! identifier explicitly targets `deletedAt`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use docwork::models::User;
//! use docwork::store::InMemoryStore;
//! use docwork::unit_of_work::UnitOfWork;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> docwork::repository::RepositoryResult<()> {
//! let uow = UnitOfWork::<User, _>::new(Arc::new(InMemoryStore::new()));
//!
//! uow.begin_transaction().await?;
//! let user = uow.insert(User::new("ada@example.com", 36)).await?;
//! uow.commit_transaction().await?;
//!
//! let found = uow.find_one_by_id(user.base.id.unwrap()).await?;
//! assert_eq!(found.email, "ada@example.com");
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use bson::{doc, oid::ObjectId, Bson, Document};
use tokio::sync::Mutex;

use crate::domain::{self, Entity, DELETED_AT, ID, UPDATED_AT};
use crate::identifier::Identifier;
use crate::repository::{QueryParams, RepositoryError, RepositoryOperation, RepositoryResult};
use crate::store::{DocumentStore, FindOptions, StoreResult};

mod bulk;

/// `deletedAt` is absent
fn live_condition() -> Document {
    doc! { "$exists": false }
}

/// `deletedAt` is present
fn trashed_condition() -> Document {
    doc! { "$exists": true }
}

/// AND `field: condition` into `filter`
///
/// A field the filter already constrains gets the extra condition under
/// `$and` so both apply.
fn and_condition(filter: &mut Document, field: &str, condition: Document) {
    if !filter.contains_key(field) {
        filter.insert(field, condition);
        return;
    }
    let clause = Bson::Document(doc! { field: condition });
    match filter.get_mut("$and") {
        Some(Bson::Array(clauses)) => clauses.push(clause),
        _ => {
            filter.insert("$and", vec![clause]);
        }
    }
}

/// Identifier filter restricted to live documents unless it targets `deletedAt`
fn scoped_filter(identifier: &Identifier) -> Document {
    let mut filter = identifier.to_filter();
    if !identifier.references_field(DELETED_AT) {
        and_condition(&mut filter, DELETED_AT, live_condition());
    }
    filter
}

/// Entity fields as a sparse equality filter, without the deletion timestamp
fn sparse_filter<E: Entity>(filter: Option<&E>) -> Document {
    let mut fields = filter.map(E::filter_fields).unwrap_or_default();
    fields.remove(DELETED_AT);
    fields
}

/// Transactional data access for one entity type
///
/// Operations on one instance are serialized on its session slot. Instances
/// are cheap; the store handle is shared.
pub struct UnitOfWork<E: Entity, S: DocumentStore> {
    store: Arc<S>,
    collection: String,
    session: Mutex<Option<S::Session>>,
    op_timeout: Option<Duration>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, S: DocumentStore> std::fmt::Debug for UnitOfWork<E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("entity", &E::entity_name())
            .field("collection", &self.collection)
            .field("backend", &self.store.backend_name())
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

impl<E: Entity, S: DocumentStore> UnitOfWork<E, S> {
    /// Unit of work on `E`'s collection, outside any transaction
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            collection: E::collection_name(),
            session: Mutex::new(None),
            op_timeout: None,
            _entity: PhantomData,
        }
    }

    /// Bound every store round-trip by `timeout`
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Collection this unit of work operates on
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Await a store round-trip under the operation timeout and map its error
    async fn bounded<T>(
        &self,
        operation: RepositoryOperation,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> RepositoryResult<T> {
        tracing::debug!(
            collection = %self.collection,
            backend = self.store.backend_name(),
            "store {}",
            operation
        );
        let result = match self.op_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                RepositoryError::timeout(
                    operation,
                    format!("{} timed out after {:?}", operation, limit),
                )
                .with_entity_type(E::entity_name())
            })?,
            None => fut.await,
        };
        result.map_err(|e| {
            RepositoryError::from(e)
                .with_operation(operation)
                .with_entity_type(E::entity_name())
        })
    }

    fn encode(operation: RepositoryOperation, entity: &E) -> RepositoryResult<Document> {
        bson::to_document(entity)
            .map_err(|e| RepositoryError::serialization_error(operation, e.to_string()))
    }

    fn decode(operation: RepositoryOperation, document: Document) -> RepositoryResult<E> {
        bson::from_document(document)
            .map_err(|e| RepositoryError::serialization_error(operation, e.to_string()))
    }

    fn decode_all(
        operation: RepositoryOperation,
        documents: Vec<Document>,
    ) -> RepositoryResult<Vec<E>> {
        documents
            .into_iter()
            .map(|document| Self::decode(operation, document))
            .collect()
    }

    fn no_match(operation: RepositoryOperation, identifier: &Identifier) -> RepositoryError {
        RepositoryError::no_match(operation).with_entity(E::entity_name(), identifier.to_string())
    }

    // Transactions

    /// Start a session and a transaction on it
    pub async fn begin_transaction(&self) -> RepositoryResult<()> {
        let mut slot = self.session.lock().await;
        if slot.is_some() {
            return Err(RepositoryError::transaction_already_in_progress());
        }
        let session = self
            .bounded(
                RepositoryOperation::BeginTransaction,
                self.store.start_session(),
            )
            .await?;
        *slot = Some(session);
        tracing::info!(collection = %self.collection, "Transaction started");
        Ok(())
    }

    /// Commit the open transaction
    ///
    /// The session is released whether or not the commit succeeds.
    pub async fn commit_transaction(&self) -> RepositoryResult<()> {
        let mut slot = self.session.lock().await;
        let Some(session) = slot.take() else {
            return Err(RepositoryError::no_transaction_in_progress());
        };
        self.bounded(
            RepositoryOperation::CommitTransaction,
            self.store.commit_session(session),
        )
        .await?;
        tracing::info!(collection = %self.collection, "Transaction committed");
        Ok(())
    }

    /// Abort the open transaction, if any
    ///
    /// Abort failures are logged and swallowed.
    pub async fn rollback_transaction(&self) {
        let mut slot = self.session.lock().await;
        let Some(session) = slot.take() else {
            return;
        };
        match self
            .bounded(
                RepositoryOperation::RollbackTransaction,
                self.store.abort_session(session),
            )
            .await
        {
            Ok(()) => tracing::info!(collection = %self.collection, "Transaction rolled back"),
            Err(e) => tracing::warn!(
                collection = %self.collection,
                "Failed to abort transaction: {}",
                e
            ),
        }
    }

    /// Whether a transaction is open
    pub async fn is_in_transaction(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Roll back any open transaction
    pub async fn close(&self) {
        self.rollback_transaction().await;
    }

    // Reads

    async fn find_with(
        &self,
        operation: RepositoryOperation,
        filter: Document,
        options: FindOptions,
    ) -> RepositoryResult<Vec<E>> {
        let mut slot = self.session.lock().await;
        let documents = self
            .bounded(
                operation,
                self.store
                    .find(slot.as_mut(), &self.collection, filter, options),
            )
            .await?;
        Self::decode_all(operation, documents)
    }

    async fn find_first(
        &self,
        operation: RepositoryOperation,
        filter: Document,
    ) -> RepositoryResult<Option<E>> {
        let mut slot = self.session.lock().await;
        let document = self
            .bounded(
                operation,
                self.store.find_one(slot.as_mut(), &self.collection, filter),
            )
            .await?;
        document.map(|d| Self::decode(operation, d)).transpose()
    }

    async fn count_with(
        &self,
        operation: RepositoryOperation,
        filter: Document,
    ) -> RepositoryResult<u64> {
        let mut slot = self.session.lock().await;
        self.bounded(
            operation,
            self.store.count(slot.as_mut(), &self.collection, filter),
        )
        .await
    }

    /// Count, then fetch one page of `params` over `base_filter`
    async fn paginate(
        &self,
        operation: RepositoryOperation,
        base_filter: Document,
        params: &QueryParams<E>,
    ) -> RepositoryResult<(Vec<E>, u64)> {
        let mut params = params.clone();
        params.validate();

        let mut filter = base_filter;
        for (key, value) in sparse_filter(params.filter.as_ref()) {
            filter.insert(key, value);
        }

        let total = self.count_with(operation, filter.clone()).await?;
        let options = FindOptions {
            sort: params.sort_document(),
            skip: (params.offset > 0).then_some(params.offset as u64),
            limit: (params.limit > 0).then_some(params.limit),
        };
        let items = self.find_with(operation, filter, options).await?;
        Ok((items, total))
    }

    /// Every live entity
    pub async fn find_all(&self) -> RepositoryResult<Vec<E>> {
        self.find_with(
            RepositoryOperation::FindAll,
            doc! { DELETED_AT: live_condition() },
            FindOptions::default(),
        )
        .await
    }

    /// Every entity matching `identifier`
    pub async fn find_many(&self, identifier: &Identifier) -> RepositoryResult<Vec<E>> {
        self.find_with(
            RepositoryOperation::FindAll,
            scoped_filter(identifier),
            FindOptions::default(),
        )
        .await
    }

    /// Live entity with the given `_id`
    pub async fn find_one_by_id(&self, id: ObjectId) -> RepositoryResult<E> {
        self.find_first(
            RepositoryOperation::FindById,
            doc! { ID: id, DELETED_AT: live_condition() },
        )
        .await?
        .ok_or_else(|| RepositoryError::not_found(E::entity_name(), id.to_hex()))
    }

    /// First entity matching `identifier`
    pub async fn find_one_by_identifier(&self, identifier: &Identifier) -> RepositoryResult<E> {
        self.find_first(RepositoryOperation::FindOne, scoped_filter(identifier))
            .await?
            .ok_or_else(|| Self::no_match(RepositoryOperation::FindOne, identifier))
    }

    /// First live entity equal to every non-default field of `filter`
    pub async fn find_one(&self, filter: &E) -> RepositoryResult<E> {
        let mut query = filter.filter_fields();
        query.insert(DELETED_AT, live_condition());
        self.find_first(RepositoryOperation::FindOne, query)
            .await?
            .ok_or_else(|| {
                RepositoryError::no_match(RepositoryOperation::FindOne)
                    .with_entity_type(E::entity_name())
            })
    }

    /// One page of live entities plus the total match count
    ///
    /// The count and the page are separate queries and may disagree under
    /// concurrent writes.
    pub async fn find_all_with_pagination(
        &self,
        params: &QueryParams<E>,
    ) -> RepositoryResult<(Vec<E>, u64)> {
        self.paginate(
            RepositoryOperation::FindAll,
            doc! { DELETED_AT: live_condition() },
            params,
        )
        .await
    }

    /// Number of entities matching `identifier`
    pub async fn count(&self, identifier: &Identifier) -> RepositoryResult<u64> {
        self.count_with(RepositoryOperation::Count, scoped_filter(identifier))
            .await
    }

    /// `_id` of the live entity whose `field` equals `value`
    pub async fn resolve_id_by_unique_field(
        &self,
        field: &str,
        value: impl Into<Bson>,
    ) -> RepositoryResult<ObjectId> {
        let value = value.into();
        let mut filter = Document::new();
        filter.insert(field, value.clone());
        filter.insert(DELETED_AT, live_condition());

        let operation = RepositoryOperation::ResolveId;
        let mut slot = self.session.lock().await;
        let document = self
            .bounded(
                operation,
                self.store.find_one(slot.as_mut(), &self.collection, filter),
            )
            .await?
            .ok_or_else(|| {
                RepositoryError::no_match(operation)
                    .with_entity(E::entity_name(), format!("{}={}", field, value))
            })?;

        document.get_object_id(ID).map_err(|e| {
            RepositoryError::type_coercion_failed(format!("{} is not an ObjectId: {}", ID, e))
                .with_operation(operation)
        })
    }

    /// Soft-deleted entities
    pub async fn get_trashed(&self) -> RepositoryResult<Vec<E>> {
        self.find_with(
            RepositoryOperation::GetTrashed,
            doc! { DELETED_AT: trashed_condition() },
            FindOptions::default(),
        )
        .await
    }

    /// One page of soft-deleted entities plus the total match count
    pub async fn get_trashed_with_pagination(
        &self,
        params: &QueryParams<E>,
    ) -> RepositoryResult<(Vec<E>, u64)> {
        self.paginate(
            RepositoryOperation::GetTrashed,
            doc! { DELETED_AT: trashed_condition() },
            params,
        )
        .await
    }

    // Writes

    /// Stamp, assign an `_id` if absent, and store `entity`
    pub async fn insert(&self, mut entity: E) -> RepositoryResult<E> {
        let operation = RepositoryOperation::Insert;
        let base = entity.base_mut();
        base.stamp_created(domain::now());
        base.id.get_or_insert_with(ObjectId::new);
        let document = Self::encode(operation, &entity)?;

        let mut slot = self.session.lock().await;
        self.bounded(
            operation,
            self.store
                .insert_one(slot.as_mut(), &self.collection, document),
        )
        .await?;
        Ok(entity)
    }

    /// Overwrite the first live match of `identifier` with `entity`'s fields
    ///
    /// Every serialized field except `_id` is set; fields `entity` leaves
    /// unset keep their stored value. Returns the stored entity after the
    /// update.
    pub async fn update(&self, identifier: &Identifier, mut entity: E) -> RepositoryResult<E> {
        let operation = RepositoryOperation::Update;
        entity.base_mut().touch(domain::now());
        let mut fields = Self::encode(operation, &entity)?;
        fields.remove(ID);

        let mut filter = identifier.to_filter();
        and_condition(&mut filter, DELETED_AT, live_condition());

        let mut slot = self.session.lock().await;
        let document = self
            .bounded(
                operation,
                self.store.find_one_and_update(
                    slot.as_mut(),
                    &self.collection,
                    filter,
                    doc! { "$set": fields },
                ),
            )
            .await?
            .ok_or_else(|| Self::no_match(operation, identifier))?;
        Self::decode(operation, document)
    }

    /// Permanently remove the first match of `identifier`
    pub async fn delete(&self, identifier: &Identifier) -> RepositoryResult<()> {
        let operation = RepositoryOperation::Delete;
        let mut slot = self.session.lock().await;
        let deleted = self
            .bounded(
                operation,
                self.store
                    .delete_one(slot.as_mut(), &self.collection, identifier.to_filter()),
            )
            .await?;
        if deleted == 0 {
            return Err(Self::no_match(operation, identifier));
        }
        Ok(())
    }

    /// Mark the first live match of `identifier` as deleted
    pub async fn soft_delete(&self, identifier: &Identifier) -> RepositoryResult<E> {
        let operation = RepositoryOperation::SoftDelete;
        let mut filter = identifier.to_filter();
        and_condition(&mut filter, DELETED_AT, live_condition());
        let at = domain::now();
        let update = doc! { "$set": { DELETED_AT: at, UPDATED_AT: at } };

        let mut slot = self.session.lock().await;
        let document = self
            .bounded(
                operation,
                self.store
                    .find_one_and_update(slot.as_mut(), &self.collection, filter, update),
            )
            .await?
            .ok_or_else(|| Self::no_match(operation, identifier))?;
        Self::decode(operation, document)
    }

    /// Permanently remove the first match of `identifier` and return it
    ///
    /// Works on live and soft-deleted documents alike.
    pub async fn hard_delete(&self, identifier: &Identifier) -> RepositoryResult<E> {
        let operation = RepositoryOperation::HardDelete;
        let mut slot = self.session.lock().await;
        let document = self
            .bounded(
                operation,
                self.store.find_one_and_delete(
                    slot.as_mut(),
                    &self.collection,
                    identifier.to_filter(),
                ),
            )
            .await?
            .ok_or_else(|| Self::no_match(operation, identifier))?;
        Self::decode(operation, document)
    }

    /// Clear the deletion mark of the first soft-deleted match of `identifier`
    pub async fn restore(&self, identifier: &Identifier) -> RepositoryResult<E> {
        let operation = RepositoryOperation::Restore;
        let mut filter = identifier.to_filter();
        and_condition(&mut filter, DELETED_AT, trashed_condition());
        let update = doc! {
            "$unset": { DELETED_AT: "" },
            "$set": { UPDATED_AT: domain::now() },
        };

        let mut slot = self.session.lock().await;
        let document = self
            .bounded(
                operation,
                self.store
                    .find_one_and_update(slot.as_mut(), &self.collection, filter, update),
            )
            .await?
            .ok_or_else(|| {
                RepositoryError::not_found_in_trash()
                    .with_entity(E::entity_name(), identifier.to_string())
            })?;
        Self::decode(operation, document)
    }

    /// Clear the deletion mark of every soft-deleted entity
    ///
    /// Returns how many entities were restored.
    pub async fn restore_all(&self) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::RestoreAll;
        let update = doc! {
            "$unset": { DELETED_AT: "" },
            "$set": { UPDATED_AT: domain::now() },
        };

        let mut slot = self.session.lock().await;
        let outcome = self
            .bounded(
                operation,
                self.store.update_many(
                    slot.as_mut(),
                    &self.collection,
                    doc! { DELETED_AT: trashed_condition() },
                    update,
                ),
            )
            .await?;
        Ok(outcome.modified)
    }

    /// Ask the store to enforce uniqueness of `field`
    ///
    /// Runs outside any open transaction. Later writes that collide fail
    /// with [`crate::repository::RepositoryErrorKind::DuplicateEntity`].
    pub async fn ensure_unique_index(&self, field: &str) -> RepositoryResult<()> {
        self.bounded(
            RepositoryOperation::CreateIndex,
            self.store.create_unique_index(&self.collection, field),
        )
        .await
    }
}

impl<E: Entity, S: DocumentStore> Drop for UnitOfWork<E, S> {
    fn drop(&mut self) {
        if self.session.get_mut().is_some() {
            tracing::warn!(
                collection = %self.collection,
                "Unit of work dropped with an open transaction; it will not be committed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::{self, Identifier};
    use crate::models::{Product, User};
    use crate::repository::{OrderDirection, RepositoryErrorKind};
    use crate::store::InMemoryStore;

    fn uow() -> UnitOfWork<User, InMemoryStore> {
        UnitOfWork::new(Arc::new(InMemoryStore::new()))
    }

    fn id_of(user: &User) -> ObjectId {
        user.base.id.unwrap()
    }

    #[test]
    fn test_and_condition_inserts_or_conjoins() {
        let mut filter = doc! { "name": "x" };
        and_condition(&mut filter, DELETED_AT, live_condition());
        assert_eq!(filter, doc! { "name": "x", "deletedAt": { "$exists": false } });

        let mut filter = doc! { "deletedAt": { "$exists": true } };
        and_condition(&mut filter, DELETED_AT, live_condition());
        assert_eq!(
            filter,
            doc! {
                "deletedAt": { "$exists": true },
                "$and": [{ "deletedAt": { "$exists": false } }],
            }
        );
    }

    #[test]
    fn test_scoped_filter_respects_deleted_at_reference() {
        let filter = scoped_filter(&identifier::by_email("a@x.io"));
        assert_eq!(
            filter,
            doc! { "email": "a@x.io", "deletedAt": { "$exists": false } }
        );

        let filter = scoped_filter(&identifier::deleted());
        assert_eq!(filter, doc! { "deletedAt": { "$exists": true } });
    }

    #[test]
    fn test_collection_name() {
        assert_eq!(uow().collection_name(), "users");
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_timestamps() {
        let uow = uow();
        let user = uow.insert(User::new("a@x.io", 30)).await.unwrap();

        assert!(user.base.id.is_some());
        assert!(user.base.created_at.is_some());
        assert_eq!(user.base.created_at, user.base.updated_at);
        assert!(!user.base.is_deleted());

        let stored = uow.find_one_by_id(id_of(&user)).await.unwrap();
        assert_eq!(stored, user);
    }

    #[tokio::test]
    async fn test_insert_keeps_existing_id() {
        let uow = uow();
        let id = ObjectId::new();
        let mut user = User::new("a@x.io", 30);
        user.base.id = Some(id);
        let inserted = uow.insert(user).await.unwrap();
        assert_eq!(inserted.base.id, Some(id));
    }

    #[tokio::test]
    async fn test_insert_duplicate_id_is_duplicate_entity() {
        let uow = uow();
        let user = uow.insert(User::new("a@x.io", 30)).await.unwrap();
        let err = uow.insert(user).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::DuplicateEntity);
        assert_eq!(err.operation, RepositoryOperation::Insert);
    }

    #[tokio::test]
    async fn test_find_one_by_id_missing_is_not_found() {
        let err = uow().find_one_by_id(ObjectId::new()).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.entity_type.as_deref(), Some("User"));
    }

    #[tokio::test]
    async fn test_find_all_and_find_many() {
        let uow = uow();
        uow.insert(User::new("a@x.io", 20)).await.unwrap();
        uow.insert(User::new("b@x.io", 40)).await.unwrap();
        let mut inactive = User::new("c@x.io", 60);
        inactive.active = false;
        uow.insert(inactive).await.unwrap();

        assert_eq!(uow.find_all().await.unwrap().len(), 3);

        let adults = uow
            .find_many(&Identifier::new().greater_than("age", 30))
            .await
            .unwrap();
        assert_eq!(adults.len(), 2);

        let inactive = uow.find_many(&identifier::inactive()).await.unwrap();
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].email, "c@x.io");

        let none = uow.find_many(&identifier::by_email("nobody")).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_find_one_by_identifier_and_entity() {
        let uow = uow();
        uow.insert(User::new("a@x.io", 20)).await.unwrap();
        uow.insert(User::new("b@x.io", 40)).await.unwrap();

        let found = uow
            .find_one_by_identifier(&identifier::by_email("b@x.io"))
            .await
            .unwrap();
        assert_eq!(found.age, 40);

        let probe = User {
            email: "a@x.io".to_string(),
            ..Default::default()
        };
        assert_eq!(uow.find_one(&probe).await.unwrap().age, 20);

        let probe = User {
            email: "a@x.io".to_string(),
            age: 99,
            ..Default::default()
        };
        let err = uow.find_one(&probe).await.unwrap_err();
        assert!(err.is_not_found());

        let err = uow
            .find_one_by_identifier(&identifier::by_email("zzz"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.entity_id.as_deref(), Some("{email: zzz}"));
    }

    #[tokio::test]
    async fn test_like_is_a_pattern_and_like_literal_is_not() {
        let uow = UnitOfWork::<Product, _>::new(Arc::new(InMemoryStore::new()));
        uow.insert(Product::new("Widget", "tools", 1.0)).await.unwrap();
        uow.insert(Product::new("WID.ET", "tools", 2.0)).await.unwrap();

        let mut names: Vec<_> = uow
            .find_many(&Identifier::new().like("name", "wid.et"))
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.base.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["WID.ET", "Widget"]);

        let literal = uow
            .find_many(&Identifier::new().like_literal("name", "wid.et"))
            .await
            .unwrap();
        assert_eq!(literal.len(), 1);
        assert_eq!(literal[0].base.name, "WID.ET");
    }

    #[tokio::test]
    async fn test_update_sets_fields_and_preserves_created_at() {
        let uow = uow();
        let user = uow.insert(User::new("a@x.io", 30)).await.unwrap();
        let id = id_of(&user);

        let mut changed = user.clone();
        changed.age = 31;
        changed.base.created_at = None;
        let updated = uow.update(&identifier::by_id(id), changed).await.unwrap();

        assert_eq!(updated.age, 31);
        assert_eq!(updated.base.id, Some(id));
        assert_eq!(updated.base.created_at, user.base.created_at);
        assert!(updated.base.updated_at >= user.base.updated_at);
    }

    #[tokio::test]
    async fn test_update_missing_or_trashed_is_not_found() {
        let uow = uow();
        let err = uow
            .update(&identifier::by_id(ObjectId::new()), User::new("a@x.io", 1))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.operation, RepositoryOperation::Update);

        let user = uow.insert(User::new("a@x.io", 30)).await.unwrap();
        let by_id = identifier::by_id(id_of(&user));
        uow.soft_delete(&by_id).await.unwrap();
        let err = uow.update(&by_id, user).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_soft_delete_trash_restore_cycle() {
        let uow = uow();
        let user = uow.insert(User::new("a@x.io", 30)).await.unwrap();
        let id = id_of(&user);
        let by_id = identifier::by_id(id);

        let deleted = uow.soft_delete(&by_id).await.unwrap();
        assert!(deleted.base.is_deleted());
        assert_eq!(deleted.base.deleted_at, deleted.base.updated_at);

        assert!(uow.find_one_by_id(id).await.unwrap_err().is_not_found());
        assert!(uow.find_all().await.unwrap().is_empty());

        let trash = uow.get_trashed().await.unwrap();
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].base.id, Some(id));

        // deletedAt-targeting identifiers see trashed documents
        let trashed = uow.find_many(&identifier::deleted()).await.unwrap();
        assert_eq!(trashed.len(), 1);

        let restored = uow.restore(&by_id).await.unwrap();
        assert!(!restored.base.is_deleted());
        assert_eq!(uow.find_one_by_id(id).await.unwrap().base.id, Some(id));
        assert!(uow.get_trashed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_soft_delete_twice_is_not_found() {
        let uow = uow();
        let user = uow.insert(User::new("a@x.io", 30)).await.unwrap();
        let by_id = identifier::by_id(id_of(&user));
        uow.soft_delete(&by_id).await.unwrap();
        let err = uow.soft_delete(&by_id).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.operation, RepositoryOperation::SoftDelete);
    }

    #[tokio::test]
    async fn test_restore_live_entity_is_not_found_in_trash() {
        let uow = uow();
        let user = uow.insert(User::new("a@x.io", 30)).await.unwrap();
        let err = uow
            .restore(&identifier::by_id(id_of(&user)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::NotFoundInTrash);
        assert_eq!(err.operation, RepositoryOperation::Restore);
    }

    #[tokio::test]
    async fn test_restore_all() {
        let uow = uow();
        for email in ["a@x.io", "b@x.io", "c@x.io"] {
            let user = uow.insert(User::new(email, 30)).await.unwrap();
            if email != "c@x.io" {
                uow.soft_delete(&identifier::by_id(id_of(&user)))
                    .await
                    .unwrap();
            }
        }
        assert_eq!(uow.find_all().await.unwrap().len(), 1);
        assert_eq!(uow.restore_all().await.unwrap(), 2);
        assert_eq!(uow.find_all().await.unwrap().len(), 3);
        assert_eq!(uow.restore_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_and_hard_delete() {
        let uow = uow();
        let a = uow.insert(User::new("a@x.io", 30)).await.unwrap();
        let b = uow.insert(User::new("b@x.io", 30)).await.unwrap();

        uow.delete(&identifier::by_id(id_of(&a))).await.unwrap();
        let err = uow.delete(&identifier::by_id(id_of(&a))).await.unwrap_err();
        assert!(err.is_not_found());

        // hard delete reaches trashed documents
        let by_b = identifier::by_id(id_of(&b));
        uow.soft_delete(&by_b).await.unwrap();
        let removed = uow.hard_delete(&by_b).await.unwrap();
        assert_eq!(removed.email, "b@x.io");
        assert!(uow.get_trashed().await.unwrap().is_empty());
        assert!(uow.hard_delete(&by_b).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_count_excludes_trashed() {
        let uow = uow();
        let user = uow.insert(User::new("a@x.io", 30)).await.unwrap();
        uow.insert(User::new("b@x.io", 30)).await.unwrap();
        uow.soft_delete(&identifier::by_id(id_of(&user)))
            .await
            .unwrap();

        assert_eq!(uow.count(&Identifier::new()).await.unwrap(), 1);
        assert_eq!(uow.count(&identifier::deleted()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pagination() {
        let uow = uow();
        for i in 0..25 {
            let mut user = User::new(format!("u{:02}@x.io", i), 20 + i);
            user.active = i % 2 == 0;
            uow.insert(user).await.unwrap();
        }

        let params = QueryParams::new()
            .sort_by("age", OrderDirection::Descending)
            .with_limit(10)
            .with_offset(20);
        let (page, total) = uow.find_all_with_pagination(&params).await.unwrap();
        assert_eq!(total, 25);
        assert_eq!(page.len(), 5);
        assert_eq!(page[0].age, 24);
        assert_eq!(page[4].age, 20);

        let probe = User {
            active: true,
            ..Default::default()
        };
        let params = QueryParams::new().with_filter(probe).with_limit(0);
        let (page, total) = uow.find_all_with_pagination(&params).await.unwrap();
        assert_eq!(total, 13);
        assert_eq!(page.len(), 13);
        assert!(page.iter().all(|u| u.active));
    }

    #[tokio::test]
    async fn test_pagination_clamps_params() {
        let uow = uow();
        for i in 0..12 {
            uow.insert(User::new(format!("u{}@x.io", i), 30)).await.unwrap();
        }
        let params = QueryParams::new().with_limit(-3).with_offset(-1);
        let (page, total) = uow.find_all_with_pagination(&params).await.unwrap();
        assert_eq!(total, 12);
        assert_eq!(page.len(), 10);
    }

    #[tokio::test]
    async fn test_trashed_pagination() {
        let uow = uow();
        for i in 0..4 {
            let user = uow
                .insert(User::new(format!("u{}@x.io", i), 30 + i))
                .await
                .unwrap();
            uow.soft_delete(&identifier::by_id(id_of(&user)))
                .await
                .unwrap();
        }
        uow.insert(User::new("live@x.io", 50)).await.unwrap();

        let params = QueryParams::new()
            .sort_by("age", OrderDirection::Ascending)
            .with_limit(3);
        let (page, total) = uow.get_trashed_with_pagination(&params).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].age, 30);
        assert!(page.iter().all(|u| u.base.is_deleted()));
    }

    #[tokio::test]
    async fn test_resolve_id_by_unique_field() {
        let uow = uow();
        let user = uow.insert(User::new("a@x.io", 30)).await.unwrap();

        let id = uow
            .resolve_id_by_unique_field("email", "a@x.io")
            .await
            .unwrap();
        assert_eq!(id, id_of(&user));

        let err = uow
            .resolve_id_by_unique_field("email", "b@x.io")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.operation, RepositoryOperation::ResolveId);
    }

    #[tokio::test]
    async fn test_unique_index_reports_duplicate() {
        let uow = uow();
        uow.ensure_unique_index("email").await.unwrap();
        uow.insert(User::new("a@x.io", 30)).await.unwrap();
        let err = uow.insert(User::new("a@x.io", 31)).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::DuplicateEntity);
    }

    #[tokio::test]
    async fn test_transaction_state_errors() {
        let uow = uow();
        assert!(!uow.is_in_transaction().await);

        let err = uow.commit_transaction().await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::NoTransactionInProgress);

        // rollback while idle is a no-op
        uow.rollback_transaction().await;

        uow.begin_transaction().await.unwrap();
        assert!(uow.is_in_transaction().await);
        let err = uow.begin_transaction().await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::TransactionAlreadyInProgress);

        uow.commit_transaction().await.unwrap();
        assert!(!uow.is_in_transaction().await);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = Arc::new(InMemoryStore::new());
        let tx = UnitOfWork::<User, _>::new(store.clone());
        let outside = UnitOfWork::<User, _>::new(store);

        tx.begin_transaction().await.unwrap();
        let user = tx.insert(User::new("a@x.io", 30)).await.unwrap();
        assert_eq!(tx.find_all().await.unwrap().len(), 1);
        assert!(outside.find_all().await.unwrap().is_empty());

        tx.commit_transaction().await.unwrap();
        assert_eq!(
            outside.find_one_by_id(id_of(&user)).await.unwrap().email,
            "a@x.io"
        );
    }

    #[tokio::test]
    async fn test_commit_fails_on_concurrent_outside_write() {
        let store = Arc::new(InMemoryStore::new());
        let tx = UnitOfWork::<User, _>::new(store.clone());
        let outside = UnitOfWork::<User, _>::new(store);

        tx.begin_transaction().await.unwrap();
        tx.insert(User::new("in@x.io", 30)).await.unwrap();
        outside.insert(User::new("out@x.io", 40)).await.unwrap();

        let err = tx.commit_transaction().await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::DatabaseError);
        assert_eq!(err.operation, RepositoryOperation::CommitTransaction);
        assert!(!tx.is_in_transaction().await);

        let emails: Vec<_> = outside
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.email)
            .collect();
        assert_eq!(emails, vec!["out@x.io".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_begins_admit_one_transaction() {
        let uow = Arc::new(uow());
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let uow = Arc::clone(&uow);
                tokio::spawn(async move { uow.begin_transaction().await })
            })
            .collect();

        let mut started = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => started += 1,
                Err(e) => {
                    assert_eq!(e.kind, RepositoryErrorKind::TransactionAlreadyInProgress);
                    rejected += 1;
                }
            }
        }
        assert_eq!((started, rejected), (1, 7));
        assert!(uow.is_in_transaction().await);

        uow.commit_transaction().await.unwrap();
        assert!(!uow.is_in_transaction().await);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let uow = uow();
        uow.begin_transaction().await.unwrap();
        uow.insert(User::new("a@x.io", 30)).await.unwrap();
        uow.rollback_transaction().await;

        assert!(!uow.is_in_transaction().await);
        assert!(uow.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_rolls_back() {
        let uow = uow();
        uow.begin_transaction().await.unwrap();
        uow.insert(User::new("a@x.io", 30)).await.unwrap();
        uow.close().await;
        assert!(!uow.is_in_transaction().await);
        assert!(uow.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_operation_timeout() {
        let uow = uow().with_operation_timeout(Some(Duration::from_millis(10)));
        let err = uow
            .bounded(
                RepositoryOperation::FindAll,
                std::future::pending::<StoreResult<()>>(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Timeout);
        assert!(err.is_retriable());

        // fast operations are unaffected
        uow.insert(User::new("a@x.io", 30)).await.unwrap();
    }
}
