//! resodex - Resonite inventory dump and catalog tool
//!
//! Logs into the platform, walks configured inventory trees into raw JSON
//! snapshots, prunes them into per-category files, and loads the
//! normalized records into a local SQLite catalog. `run` chains the whole
//! pipeline for unattended use.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use resodex::auth::SessionManager;
use resodex::services::{CatalogWriter, Normalizer, ResoniteClient, TraversalEngine};
use resodex_common::config::{Config, RootSpec};

/// Command-line arguments for resodex
#[derive(Parser, Debug)]
#[command(name = "resodex")]
#[command(about = "Resonite inventory dump and catalog tool")]
#[command(version)]
struct Cli {
    /// Config file path (defaults to ./resodex.toml, then the platform
    /// config directory)
    #[arg(short, long, global = true, env = "RESODEX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in and store the session token
    Login {
        /// Platform username
        username: String,
        /// Password (prefer the environment variable over the flag)
        #[arg(long, env = "RESODEX_PASSWORD", hide_env_values = true)]
        password: String,
        /// One-time 2FA code, if the account uses it
        #[arg(long, env = "RESODEX_TOTP", hide_env_values = true)]
        totp: Option<String>,
    },
    /// Invalidate the session and remove the stored token
    Logout,
    /// Walk inventory trees into raw JSON snapshots
    Dump {
        /// Owner user or group ID (case sensitive); requires --path
        #[arg(long, requires = "path")]
        owner: Option<String>,
        /// Start folder relative to the owner's inventory; requires --owner
        #[arg(long, requires = "owner")]
        path: Option<String>,
    },
    /// Prune raw snapshots into per-category JSON files
    Prune,
    /// Load normalized records from snapshots into the SQLite catalog
    Load,
    /// Unattended pipeline: dump configured roots, prune, load
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    info!("resodex v{}", env!("CARGO_PKG_VERSION"));

    let session = SessionManager::new(
        &config.api_url,
        &config.token_path,
        config.token_max_age_days,
    )?;

    match cli.command {
        Commands::Login {
            username,
            password,
            totp,
        } => {
            session.login(&username, &password, totp.as_deref()).await?;
        }
        Commands::Logout => {
            session.logout().await?;
        }
        Commands::Dump { owner, path } => {
            let roots = match (owner, path) {
                (Some(owner), Some(path)) => vec![RootSpec { owner, path }],
                _ => config.roots.clone(),
            };
            dump(&config, &session, &roots).await?;
        }
        Commands::Prune => {
            Normalizer::new(&config.asset_url).prune_all(&config.dump_dir, &config.parsed_dir)?;
        }
        Commands::Load => {
            load(&config).await?;
        }
        Commands::Run => {
            dump(&config, &session, &config.roots).await?;
            Normalizer::new(&config.asset_url).prune_all(&config.dump_dir, &config.parsed_dir)?;
            load(&config).await?;
        }
    }

    Ok(())
}

async fn dump(config: &Config, session: &SessionManager, roots: &[RootSpec]) -> Result<()> {
    let auth = session.load_valid_context()?;
    let client = ResoniteClient::new(&config.api_url)?;
    let engine = TraversalEngine::new(
        &client,
        &config.dump_dir,
        config.retry_attempts,
        config.retry_backoff_ms,
    );
    let stats = engine.dump_all(roots, &auth).await?;
    info!(
        "dumped {} directories ({} records) into {}",
        stats.directories_visited,
        stats.records_seen,
        config.dump_dir.display()
    );
    Ok(())
}

async fn load(config: &Config) -> Result<()> {
    let normalizer = Normalizer::new(&config.asset_url);
    let writer = CatalogWriter::open(&config.database_path).await?;
    let stats = writer.load_dir(&config.dump_dir, &normalizer).await?;
    writer.close().await;
    info!(
        "loaded {} items, {} folders, {} worlds into {}",
        stats.items,
        stats.folders,
        stats.worlds,
        config.database_path.display()
    );
    Ok(())
}
