//! Unit-of-Work factory
//!
//! A [`UnitOfWorkFactory`] owns the shared store handle and hands out a fresh
//! [`UnitOfWork`] per call. Cloning the factory shares the store.
//!
//! ```rust
//! use docwork::factory::UnitOfWorkFactory;
//! use docwork::models::Product;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> docwork::repository::RepositoryResult<()> {
//! let factory = UnitOfWorkFactory::in_memory();
//!
//! let uow = factory.create_with_transaction::<Product>().await?;
//! uow.insert(Product::new("Widget", "tools", 9.5)).await?;
//! uow.commit_transaction().await?;
//!
//! assert_eq!(factory.create::<Product>().find_all().await?.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::domain::Entity;
use crate::repository::RepositoryResult;
use crate::store::{DocumentStore, InMemoryStore};
use crate::unit_of_work::UnitOfWork;

#[cfg(feature = "mongodb")]
use crate::{
    config::MongoConfig,
    repository::{RepositoryError, RepositoryOperation},
    store::MongoStore,
};

/// Builds [`UnitOfWork`] instances over one shared store
#[derive(Debug)]
pub struct UnitOfWorkFactory<S: DocumentStore> {
    store: Arc<S>,
    op_timeout: Option<Duration>,
}

impl<S: DocumentStore> Clone for UnitOfWorkFactory<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            op_timeout: self.op_timeout,
        }
    }
}

impl<S: DocumentStore> UnitOfWorkFactory<S> {
    /// Factory over an existing store
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    /// Factory over a store handle shared with other owners
    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            op_timeout: None,
        }
    }

    /// Bound every store round-trip of created units of work
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// The shared store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Operation timeout handed to created units of work
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.op_timeout
    }

    /// New unit of work for `E`, outside any transaction
    pub fn create<E: Entity>(&self) -> UnitOfWork<E, S> {
        UnitOfWork::new(Arc::clone(&self.store)).with_operation_timeout(self.op_timeout)
    }

    /// New unit of work for `E` with a transaction already started
    ///
    /// The caller owns the transaction; nothing commits or rolls it back
    /// automatically.
    pub async fn create_with_transaction<E: Entity>(&self) -> RepositoryResult<UnitOfWork<E, S>> {
        let uow = self.create::<E>();
        uow.begin_transaction().await?;
        Ok(uow)
    }
}

impl UnitOfWorkFactory<InMemoryStore> {
    /// Factory over a fresh, empty in-memory store
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new())
    }
}

#[cfg(feature = "mongodb")]
impl UnitOfWorkFactory<MongoStore> {
    /// Validate `config`, connect and ping
    ///
    /// Invalid settings fail with `ConfigInvalid`; an unreachable server
    /// fails with `ConnectionFailed`. The configured timeout bounds the
    /// ping and every later store round-trip.
    pub async fn connect(config: &MongoConfig) -> RepositoryResult<Self> {
        config.validate()?;
        let store = MongoStore::connect(config).await.map_err(|e| {
            RepositoryError::connection_failed(e.to_string())
                .with_operation(RepositoryOperation::Connect)
        })?;
        Ok(Self::new(store).with_operation_timeout(config.timeout()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier;
    use crate::models::{Product, User};
    use crate::repository::RepositoryErrorKind;

    #[tokio::test]
    async fn test_created_units_share_the_store() {
        let factory = UnitOfWorkFactory::in_memory();
        let users = factory.create::<User>();
        users.insert(User::new("a@x.io", 30)).await.unwrap();

        let other = factory.clone().create::<User>();
        assert_eq!(other.find_all().await.unwrap().len(), 1);
        assert!(!other.is_in_transaction().await);
    }

    #[tokio::test]
    async fn test_created_units_use_their_entity_collection() {
        let factory = UnitOfWorkFactory::in_memory();
        assert_eq!(factory.create::<User>().collection_name(), "users");
        assert_eq!(factory.create::<Product>().collection_name(), "products");

        factory
            .create::<Product>()
            .insert(Product::new("Widget", "tools", 1.0))
            .await
            .unwrap();
        assert!(factory.create::<User>().find_all().await.unwrap().is_empty());
        assert_eq!(factory.store().collection_names().await, vec!["products"]);
    }

    #[tokio::test]
    async fn test_create_with_transaction_starts_one() {
        let factory = UnitOfWorkFactory::in_memory();
        let uow = factory.create_with_transaction::<User>().await.unwrap();
        assert!(uow.is_in_transaction().await);

        let err = uow.begin_transaction().await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::TransactionAlreadyInProgress);

        let user = uow.insert(User::new("a@x.io", 30)).await.unwrap();
        uow.rollback_transaction().await;

        let err = factory
            .create::<User>()
            .find_one_by_identifier(&identifier::by_id(user.base.id.unwrap()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_operation_timeout_is_carried() {
        let factory = UnitOfWorkFactory::in_memory()
            .with_operation_timeout(Some(Duration::from_secs(3)));
        assert_eq!(factory.operation_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(factory.clone().operation_timeout(), Some(Duration::from_secs(3)));
    }

    #[cfg(feature = "mongodb")]
    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let config = MongoConfig {
            host: String::new(),
            ..Default::default()
        };
        let err = UnitOfWorkFactory::connect(&config).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ConfigInvalid);
    }
}
