use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod utils;

use commands::config::ConfigCommands;
use commands::demo::Backend;

/// docwork - Unit of Work and repositories over a document database
#[derive(Parser)]
#[command(name = "docwork")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to the XDG search path)
    #[arg(long, global = true, env = "DOCWORK_CONFIG")]
    config: Option<PathBuf>,

    /// Emit JSON tracing output at the configured log level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and check configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Check connectivity to the configured store
    Ping,
    /// Walk through the service, repository and unit-of-work layers
    Demo {
        /// Store to run against
        #[arg(long, value_enum, default_value_t = Backend::Memory)]
        backend: Backend,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = cli.config.as_deref();
    if let Commands::Config { command } = cli.command {
        return commands::config::execute(command, path).await;
    }

    let config = utils::load_config(path)?;
    if cli.verbose {
        docwork::observability::init_tracing(&config)?;
    }

    match cli.command {
        Commands::Ping => commands::ping::execute(&config).await,
        Commands::Demo { backend } => commands::demo::execute(&config, backend).await,
        Commands::Config { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Handle result
    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);

            // Show context if available
            if let Some(source) = e.source() {
                eprintln!("\n{} {}", "Caused by:".yellow(), source);
            }

            std::process::exit(1);
        }
    }
}
