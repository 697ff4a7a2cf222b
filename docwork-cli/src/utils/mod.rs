use anyhow::{Context, Result};
use colored::Colorize;
use docwork::config::Config;
use std::path::Path;

/// Load configuration from an explicit file or the standard search path
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => Config::load_for_service("docwork").context("Failed to load configuration")?,
    };
    Ok(config)
}

/// Success message with checkmark
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Info message
pub fn info(message: &str) {
    println!("{} {}", "→".blue().bold(), message);
}

/// Warning message
pub fn warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Section header
pub fn section(title: &str) {
    println!("\n{}", title.bold().underline());
}
