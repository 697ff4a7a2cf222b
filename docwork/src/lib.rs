//! # docwork
//!
//! Typed Unit-of-Work, repository and service layers over a document database.
//!
//! ## Features
//!
//! - **Unit of Work**: transaction bracketing, CRUD, batched writes, soft delete and restore
//! - **Filter builder**: fluent [`Identifier`](identifier::Identifier) rendered to native filters
//! - **Repositories**: generic pass-through plus user and product finders and statistics
//! - **Services**: input validation and business rules on top of repositories
//! - **Backends**: in-memory store for tests and demos, MongoDB behind the `mongodb` feature
//! - **Configuration**: figment layering of defaults, TOML files and `DOCWORK_` variables
//!
//! ## Example
//!
//! ```rust
//! use docwork::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> docwork::repository::RepositoryResult<()> {
//! let factory = UnitOfWorkFactory::in_memory();
//! let users = UserService::new(UserRepository::new(BaseRepository::new(factory.clone())));
//!
//! users.ensure_indexes().await?;
//! let ada = users.create_user("ada@example.com", 36).await?;
//!
//! // Multi-step work shares one transaction through a unit of work
//! let uow = factory.create_with_transaction::<User>().await?;
//! uow.soft_delete(&identifier::by_id(ada.base.id.unwrap())).await?;
//! uow.commit_transaction().await?;
//!
//! assert_eq!(users.get_user_statistics().await?.total_users, 0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod factory;
pub mod identifier;
pub mod models;
pub mod observability;
pub mod repository;
pub mod services;
pub mod store;
pub mod unit_of_work;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, MongoConfig, ServiceConfig};
    pub use crate::domain::{BaseEntity, Entity};
    pub use crate::error::{DatabaseError, DatabaseErrorKind, DatabaseOperation, Error, Result};
    pub use crate::factory::UnitOfWorkFactory;
    pub use crate::identifier::{self, Identifier};
    pub use crate::models::{Product, ProductStats, User, UserStats};
    pub use crate::observability::init_tracing;
    pub use crate::repository::{
        BaseRepository, OrderDirection, ProductRepository, QueryParams, Repository,
        RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult,
        SoftDeleteRepository, UserRepository,
    };
    pub use crate::services::{ProductService, UserService};
    pub use crate::store::{DocumentStore, InMemoryStore};
    pub use crate::unit_of_work::UnitOfWork;

    #[cfg(feature = "mongodb")]
    pub use crate::store::MongoStore;
}
