//! Batched writes
//!
//! Every batch is sent as one unordered request: a failing item does not
//! stop the others, and items already applied stay applied when the batch
//! reports an error.

use bson::{doc, oid::ObjectId, Bson};

use super::{and_condition, live_condition, UnitOfWork};
use crate::domain::{self, Entity, DELETED_AT, ID, UPDATED_AT};
use crate::identifier::Identifier;
use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult};
use crate::store::{DocumentStore, WriteModel};

impl<E: Entity, S: DocumentStore> UnitOfWork<E, S> {
    /// Stamp, assign missing `_id`s, and store every entity in one batch
    pub async fn bulk_insert(&self, mut entities: Vec<E>) -> RepositoryResult<Vec<E>> {
        if entities.is_empty() {
            return Ok(entities);
        }
        let operation = RepositoryOperation::BulkInsert;
        let at = domain::now();
        let documents = entities
            .iter_mut()
            .map(|entity| {
                let base = entity.base_mut();
                base.stamp_created(at);
                base.id.get_or_insert_with(ObjectId::new);
                Self::encode(operation, entity)
            })
            .collect::<RepositoryResult<Vec<_>>>()?;

        let mut slot = self.session.lock().await;
        let inserted = self
            .bounded(
                operation,
                self.store
                    .insert_many(slot.as_mut(), &self.collection, documents),
            )
            .await?;
        tracing::debug!(collection = %self.collection, inserted, "Bulk insert finished");
        Ok(entities)
    }

    /// Overwrite every live entity, matched by `_id`, in one batch
    ///
    /// Fails with `BulkPartialMismatch` when fewer live documents were matched
    /// than entities given; the modifications that did happen are kept. A
    /// matched document whose content was already identical counts as updated.
    pub async fn bulk_update(&self, mut entities: Vec<E>) -> RepositoryResult<Vec<E>> {
        if entities.is_empty() {
            return Ok(entities);
        }
        let operation = RepositoryOperation::BulkUpdate;
        let at = domain::now();
        let mut models = Vec::with_capacity(entities.len());
        for entity in &mut entities {
            entity.base_mut().touch(at);
            let id = entity.id().map_or(Bson::Null, Bson::ObjectId);
            let mut fields = Self::encode(operation, entity)?;
            fields.remove(ID);
            models.push(WriteModel::UpdateOne {
                filter: doc! { ID: id, DELETED_AT: live_condition() },
                update: doc! { "$set": fields },
            });
        }

        let mut slot = self.session.lock().await;
        let outcome = self
            .bounded(
                operation,
                self.store
                    .bulk_write(slot.as_mut(), &self.collection, models),
            )
            .await?;

        if outcome.matched != entities.len() as u64 {
            tracing::warn!(
                collection = %self.collection,
                matched = outcome.matched,
                modified = outcome.modified,
                requested = entities.len(),
                "Bulk update modified fewer documents than requested"
            );
            return Err(
                RepositoryError::bulk_partial_mismatch(outcome.matched, entities.len())
                    .with_entity_type(E::entity_name()),
            );
        }
        Ok(entities)
    }

    /// Soft-delete the first live match of each identifier in one batch
    ///
    /// Returns how many entities were marked deleted.
    pub async fn bulk_soft_delete(&self, identifiers: &[Identifier]) -> RepositoryResult<u64> {
        if identifiers.is_empty() {
            return Ok(0);
        }
        let at = domain::now();
        let models = identifiers
            .iter()
            .map(|identifier| {
                let mut filter = identifier.to_filter();
                and_condition(&mut filter, DELETED_AT, live_condition());
                WriteModel::UpdateOne {
                    filter,
                    update: doc! { "$set": { DELETED_AT: at, UPDATED_AT: at } },
                }
            })
            .collect();

        let mut slot = self.session.lock().await;
        let outcome = self
            .bounded(
                RepositoryOperation::BulkSoftDelete,
                self.store
                    .bulk_write(slot.as_mut(), &self.collection, models),
            )
            .await?;
        Ok(outcome.modified)
    }

    /// Permanently remove the first match of each identifier in one batch
    ///
    /// Returns how many documents were removed.
    pub async fn bulk_hard_delete(&self, identifiers: &[Identifier]) -> RepositoryResult<u64> {
        if identifiers.is_empty() {
            return Ok(0);
        }
        let models = identifiers
            .iter()
            .map(|identifier| WriteModel::DeleteOne {
                filter: identifier.to_filter(),
            })
            .collect();

        let mut slot = self.session.lock().await;
        let outcome = self
            .bounded(
                RepositoryOperation::BulkHardDelete,
                self.store
                    .bulk_write(slot.as_mut(), &self.collection, models),
            )
            .await?;
        Ok(outcome.deleted)
    }
}
