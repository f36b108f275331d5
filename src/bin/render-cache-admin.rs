//! # Render Cache Admin
//!
//! Operator tool for the external render cache: check store health, inspect
//! an entry, revalidate or prune tags, and print the effective configuration.
//! Uses the same configuration layering as the host.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use render_cache::{CacheHandler, ConfigManager, TagInput};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "render-cache-admin")]
#[command(about = "Inspect and maintain the external render cache")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to load (development, test, production, ...)
    #[arg(short, long)]
    environment: Option<String>,

    /// Configuration directory path (default: ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the store and ping it
    Health,

    /// Print the entry stored under a key
    Get {
        /// Cache key as the host passes it (without the namespace prefix)
        key: String,
    },

    /// Invalidate every entry carrying any of the given tags
    Revalidate {
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Remove tag index members whose entries have expired
    Prune {
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Print the effective configuration with credentials redacted
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    let environment = cli
        .environment
        .unwrap_or_else(ConfigManager::detect_environment);
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir, &environment)
        .context("failed to load cache configuration")?;
    info!(environment = %manager.environment(), "Configuration loaded");

    if let Commands::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
        return Ok(());
    }

    let Some(cache) = CacheHandler::from_config(manager.config()) else {
        bail!("external cache is not enabled or not configured for '{environment}'");
    };

    let outcome = run(&cache, cli.command).await;
    cache.disconnect().await;
    outcome
}

async fn run(cache: &CacheHandler, command: Commands) -> Result<()> {
    match command {
        Commands::Health => {
            if !cache.health_check().await {
                bail!(
                    "cache store unhealthy (state: {})",
                    cache.connection_state()
                );
            }
            println!("healthy ({})", cache.connection_state());
        }
        Commands::Get { key } => match cache.get(&key).await {
            Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
            None => println!("miss"),
        },
        Commands::Revalidate { tags } => {
            let deleted = cache.revalidate_tag(TagInput::Many(tags)).await;
            println!("deleted {deleted} entries");
        }
        Commands::Prune { tags } => {
            let removed = cache.prune_tag_index(TagInput::Many(tags)).await;
            println!("removed {removed} stale index members");
        }
        Commands::Config => {}
    }

    let stats = cache.stats();
    if stats.failures > 0 {
        bail!("{} cache operation(s) failed, see logs", stats.failures);
    }
    Ok(())
}
