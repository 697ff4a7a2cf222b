use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use docwork::config::Config;
use std::path::Path;

use crate::utils;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the merged configuration as JSON (password redacted)
    Show,
    /// Check the merged configuration and report the first problem
    Validate,
    /// Print the MongoDB connection string
    Uri {
        /// Include credentials instead of redacting them
        #[arg(long)]
        reveal: bool,
    },
}

pub async fn execute(command: ConfigCommands, path: Option<&Path>) -> Result<()> {
    let config = utils::load_config(path)?;
    match command {
        ConfigCommands::Show => show(&config),
        ConfigCommands::Validate => validate(&config),
        ConfigCommands::Uri { reveal } => {
            if reveal {
                utils::warning("Printing credentials in clear text");
                println!("{}", config.mongodb.connection_string());
            } else {
                println!("{}", config.mongodb.sanitized_connection_string());
            }
            Ok(())
        }
    }
}

fn show(config: &Config) -> Result<()> {
    let mut redacted = config.clone();
    if !redacted.mongodb.password.is_empty() {
        redacted.mongodb.password = "<redacted>".to_string();
    }
    println!("{}", serde_json::to_string_pretty(&redacted)?);
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    utils::info(&format!(
        "Service {} ({})",
        config.service.name.cyan(),
        config.service.environment
    ));
    config.validate()?;
    utils::success(&format!(
        "Configuration valid: {}",
        config.mongodb.sanitized_connection_string()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_database() {
        let mut config = Config::default();
        config.mongodb.database.clear();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("database name cannot be empty"));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(validate(&Config::default()).is_ok());
    }
}
