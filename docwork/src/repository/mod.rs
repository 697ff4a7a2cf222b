//! Repository traits and implementations
//!
//! # Features
//!
//! - **Generic CRUD**: [`Repository`] trait for insert, read, update, delete and batched writes
//! - **Soft Delete**: [`SoftDeleteRepository`] for reversible deletion and trash queries
//! - **Pass-through**: [`BaseRepository`] backs both traits with one unit of work per call
//! - **Specific finders**: [`UserRepository`] and [`ProductRepository`]
//! - **Pagination**: [`QueryParams`] for filtering, ordering and paging listings
//!
//! # Example
//!
//! ```rust
//! use docwork::factory::UnitOfWorkFactory;
//! use docwork::models::Product;
//! use docwork::repository::{BaseRepository, ProductRepository, Repository};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> docwork::repository::RepositoryResult<()> {
//! let products = ProductRepository::new(BaseRepository::new(UnitOfWorkFactory::in_memory()));
//!
//! products.insert(Product::new("Laptop", "electronics", 999.0)).await?;
//! products.insert(Product::new("Phone", "electronics", 499.0)).await?;
//!
//! let stats = products.get_product_stats().await?;
//! assert_eq!(stats.total_products, 2);
//! assert_eq!(stats.categories, vec!["electronics"]);
//! # Ok(())
//! # }
//! ```

mod base;
mod error;
mod pagination;
mod products;
mod traits;
mod users;

pub use base::BaseRepository;
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use pagination::{OrderDirection, QueryParams, DEFAULT_LIMIT, MAX_LIMIT};
pub use products::ProductRepository;
pub use traits::{Repository, RepositoryResult, SoftDeleteRepository};
pub use users::UserRepository;
