use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use docwork::config::Config;
use docwork::factory::UnitOfWorkFactory;
use docwork::identifier::{self, Identifier};
use docwork::models::{Product, User};
use docwork::repository::{
    BaseRepository, OrderDirection, ProductRepository, QueryParams, RepositoryErrorKind,
    UserRepository,
};
use docwork::services::{ProductService, UserService};
use docwork::store::DocumentStore;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::utils;

/// Store the demo runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Fresh in-memory store, discarded on exit
    Memory,
    /// MongoDB deployment from the configuration (needs the `mongodb` feature)
    Mongodb,
}

pub async fn execute(config: &Config, backend: Backend) -> Result<()> {
    utils::section("docwork layered demo");
    println!("Service -> Repository -> Base Repository -> Unit of Work -> Store");

    match backend {
        Backend::Memory => run(UnitOfWorkFactory::in_memory()).await,
        Backend::Mongodb => run_mongodb(config).await,
    }
}

#[cfg(feature = "mongodb")]
async fn run_mongodb(config: &Config) -> Result<()> {
    config.validate()?;
    utils::info(&format!(
        "Connecting to {}",
        config.mongodb.sanitized_connection_string()
    ));
    let factory = UnitOfWorkFactory::connect(&config.mongodb)
        .await
        .context("MongoDB connection failed")?;
    run(factory).await
}

#[cfg(not(feature = "mongodb"))]
async fn run_mongodb(_config: &Config) -> Result<()> {
    anyhow::bail!("This binary was built without the `mongodb` feature; use --backend memory")
}

/// Suffix keeping repeated runs against a persistent store apart
fn run_tag() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_default()
}

async fn run<S: DocumentStore>(factory: UnitOfWorkFactory<S>) -> Result<()> {
    utils::info(&format!("Backend: {}", factory.store().backend_name()));
    let tag = run_tag();
    tracing::debug!(backend = factory.store().backend_name(), tag = %tag, "Starting demo");

    let users = UserService::new(UserRepository::new(BaseRepository::new(factory.clone())));
    let products = ProductService::new(ProductRepository::new(BaseRepository::new(
        factory.clone(),
    )));
    users.ensure_indexes().await?;

    utils::section("1. Users");
    let alice = users
        .create_user(&format!("alice.{}@example.com", tag), 28)
        .await?;
    let bob = users
        .create_user(&format!("bob.{}@example.com", tag), 41)
        .await?;
    for user in [&alice, &bob] {
        utils::success(&format!("Created {} ({})", user.email, id_hex(user)));
    }
    match users.create_user(&alice.email, 30).await {
        Err(e) if e.kind == RepositoryErrorKind::DuplicateEntity => {
            utils::success("Duplicate email rejected")
        }
        Err(e) => return Err(e.into()),
        Ok(_) => utils::warning("Duplicate email was accepted"),
    }
    match users.create_user("", 30).await {
        Err(e) => utils::success(&format!("Validation: {}", e.message)),
        Ok(_) => utils::warning("Empty email was accepted"),
    }

    utils::section("2. Products");
    let laptop = products
        .create_product(&format!("Laptop-{}", tag), "electronics", 999.99)
        .await?;
    let desk = products
        .create_product(&format!("Desk-{}", tag), "furniture", 249.5)
        .await?;
    for product in [&laptop, &desk] {
        utils::success(&format!(
            "Created {} ({})",
            product.base.name,
            id_hex(product)
        ));
    }

    utils::section("3. Business rules");
    let mut older = alice.clone();
    older.age += 1;
    let older = users.update_user(older).await?;
    utils::success(&format!("Updated {} to age {}", older.email, older.age));
    if let Some(id) = bob.base.id {
        users.deactivate_user(id).await?;
        utils::success(&format!("Deactivated {}", bob.email));
    }
    if let Some(id) = desk.base.id {
        let desk = products.set_product_stock(id, false).await?;
        utils::success(&format!("{} in stock: {}", desk.base.name, desk.in_stock));
    }

    utils::section("4. Queries");
    println!(
        "Active users: {}",
        users.get_all_active_users().await?.len()
    );
    println!(
        "Electronics: {}",
        products.get_products_by_category("electronics").await?.len()
    );
    println!(
        "In stock: {}",
        products.get_in_stock_products().await?.len()
    );

    utils::section("5. Bulk and pagination");
    let batch: Vec<User> = (0..5)
        .map(|i| User::new(format!("bulk{}.{}@example.com", i, tag), 20 + i * 5))
        .collect();
    let batch = users.create_users(batch).await?;
    utils::success(&format!("Bulk created {} users", batch.len()));

    let mut page_params = QueryParams::new()
        .sort_by("age", OrderDirection::Descending)
        .with_limit(3);
    page_params.validate();
    let (page, total) = factory
        .create::<User>()
        .find_all_with_pagination(&page_params)
        .await?;
    let (page_no, size) = page_params.page_info();
    println!(
        "Page {} (size {}): {} of {} users, oldest {}",
        page_no,
        size,
        page.len(),
        total,
        page.first().map(|u| u.age).unwrap_or_default()
    );

    // Remove one batch member behind the caller's back, then update the whole batch
    let uow = factory.create::<User>();
    if let Some(gone) = batch.last() {
        uow.delete(&identifier::by_email(&gone.email)).await?;
    }
    let stale: Vec<User> = batch
        .iter()
        .cloned()
        .map(|mut user| {
            user.active = false;
            user
        })
        .collect();
    match uow.bulk_update(stale).await {
        Err(e) if e.kind == RepositoryErrorKind::BulkPartialMismatch => {
            utils::success(&format!("Partial bulk update reported: {}", e.message))
        }
        Err(e) => return Err(e.into()),
        Ok(_) => utils::warning("Bulk update against a missing id reported success"),
    }

    utils::section("6. Soft delete and restore");
    let target = Identifier::new().equal("email", batch[0].email.as_str());
    let trashed = uow.soft_delete(&target).await?;
    utils::success(&format!("Soft deleted {}", trashed.email));
    match uow.find_one_by_identifier(&target).await {
        Err(e) if e.is_not_found() => println!("Hidden from normal reads"),
        Err(e) => return Err(e.into()),
        Ok(_) => utils::warning("Soft-deleted user still visible"),
    }
    println!("Trash size: {}", uow.get_trashed().await?.len());
    let restored = uow.restore(&target).await?;
    utils::success(&format!("Restored {}", restored.email));

    utils::section("7. Transaction");
    let tx = factory.create_with_transaction::<Product>().await?;
    let staged = tx
        .insert(Product::new(format!("Chair-{}", tag), "furniture", 89.0))
        .await;
    match staged {
        Ok(chair) => {
            tx.commit_transaction().await?;
            utils::success(&format!("Committed {}", chair.base.name));
        }
        Err(e) => {
            tx.rollback_transaction().await;
            return Err(e).context("transactional insert failed");
        }
    }
    let rolled_back = factory.create_with_transaction::<Product>().await?;
    rolled_back
        .insert(Product::new(format!("Ghost-{}", tag), "furniture", 1.0))
        .await?;
    rolled_back.rollback_transaction().await;
    let ghosts = factory
        .create::<Product>()
        .count(&identifier::by_slug(&format!("furniture-Ghost-{}", tag)))
        .await?;
    println!("Rolled-back insert visible afterwards: {}", ghosts > 0);

    utils::section("8. Statistics");
    let user_stats = users.get_user_statistics().await?;
    let product_stats = products.get_product_statistics().await?;
    println!("{}", serde_json::to_string_pretty(&user_stats)?);
    println!("{}", serde_json::to_string_pretty(&product_stats)?);

    println!("\n{}", "Demo completed".green().bold());
    Ok(())
}

fn id_hex<E: docwork::domain::Entity>(entity: &E) -> String {
    entity.id().map(|id| id.to_hex()).unwrap_or_default()
}
