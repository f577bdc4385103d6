//! hutch - install developer tools into versioned trees.

mod provider;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hutch_core::{Engine, EngineConfig, LogReporter};
use provider::RegistryProvider;

const DEFAULT_REGISTRY: &str = "https://dist.hutch.sh";

#[derive(Parser)]
#[command(name = "hutch", version, about = "Install developer tools into versioned trees")]
struct Cli {
    /// Root directory packages are installed into
    #[arg(long, global = true)]
    install_root: Option<PathBuf>,

    /// Download cache directory
    #[arg(long, global = true)]
    cache_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install one or more packages (name, name@1.2, name^1)
    Install {
        /// Package specs to install
        #[arg(required = true)]
        specs: Vec<String>,
    },
    /// Manage the download cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Remove stale entries and shrink the cache under its size budget
    Prune {
        /// Entries idle longer than this are removed
        #[arg(long, default_value_t = 30)]
        max_age_days: i64,

        /// Upper bound on total cache size, in bytes
        #[arg(long, default_value_t = 5 * 1024 * 1024 * 1024)]
        max_size_bytes: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let install_root = cli
        .install_root
        .unwrap_or_else(hutch_core::default_install_root);
    let cache_root = cli.cache_root.unwrap_or_else(hutch_core::default_cache_root);
    let config = EngineConfig::new(install_root.clone(), cache_root)?;

    let registry = std::env::var("HUTCH_REGISTRY").unwrap_or_else(|_| DEFAULT_REGISTRY.to_string());
    let provider = Arc::new(RegistryProvider::new(registry)?);
    let mut engine = Engine::new(config, provider)?.with_reporter(Arc::new(LogReporter));

    match cli.command {
        Commands::Install { specs } => {
            let report = engine.install(&specs).await.context("install failed")?;
            for manifest in &report.installed {
                println!("{} {} -> {}", manifest.domain, manifest.version, manifest.install_path.display());
            }
            for (name, err) in &report.failed {
                eprintln!("failed: {name}: {err}");
            }
            println!(
                "{} of {} requested packages installed",
                report.installed.len(),
                report.requested
            );
            if !report.failed.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Cache { command } => match command {
            CacheCommands::Prune {
                max_age_days,
                max_size_bytes,
            } => {
                let evicted = engine.evict_cache(max_age_days, max_size_bytes)?;
                println!("evicted {} cache entries", evicted.len());
            }
        },
    }

    Ok(())
}
