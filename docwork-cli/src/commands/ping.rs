use anyhow::Result;
use docwork::config::Config;
use std::time::Instant;

use crate::utils;

/// Connect to the configured MongoDB deployment and time a ping
#[cfg(feature = "mongodb")]
pub async fn execute(config: &Config) -> Result<()> {
    use docwork::factory::UnitOfWorkFactory;
    use docwork::store::DocumentStore;

    utils::info(&format!(
        "Connecting to {}",
        config.mongodb.sanitized_connection_string()
    ));
    let factory = UnitOfWorkFactory::connect(&config.mongodb).await?;

    let started = Instant::now();
    factory.store().ping().await?;
    utils::success(&format!(
        "{} responded in {} ms",
        factory.store().backend_name(),
        started.elapsed().as_millis()
    ));
    Ok(())
}

/// Without the `mongodb` feature there is nothing remote to reach
#[cfg(not(feature = "mongodb"))]
pub async fn execute(config: &Config) -> Result<()> {
    config.validate()?;
    let started = Instant::now();
    let store = docwork::store::InMemoryStore::new();
    docwork::store::DocumentStore::ping(&store).await?;
    utils::warning("Built without the `mongodb` feature; pinged the in-memory store instead");
    utils::success(&format!(
        "memory responded in {} ms",
        started.elapsed().as_millis()
    ));
    Ok(())
}
