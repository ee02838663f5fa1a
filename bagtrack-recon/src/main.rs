//! bagtrack-recon - Bag-tag reconciliation service
//!
//! Serves scan submission, flight status commands, manifest import and
//! cascade delete over HTTP, with a live SSE event feed.

use anyhow::{Context, Result};
use bagtrack_common::config::{
    load_toml_config, load_toml_config_or_default, RootFolderInitializer, RootFolderResolver,
    TomlConfig,
};
use bagtrack_common::db::{init_database, load_reconciliation_config};
use bagtrack_recon::artifacts::FsArtifactStore;
use bagtrack_recon::events::EventBus;
use bagtrack_recon::store::Stores;
use bagtrack_recon::{build_router, AppState};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "bagtrack-recon", version, about = "Bag-tag reconciliation service")]
struct Args {
    /// Root folder holding the database and artifacts
    #[arg(long, env = "BAGTRACK_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to listen on, overrides the config file
    #[arg(long)]
    bind: Option<String>,

    /// Explicit config file path
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => load_toml_config_or_default(),
    };

    init_tracing(&config)?;

    // Build identification first, before any database work
    info!(
        "Starting bagtrack-recon v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(args.root_folder)
        .with_toml(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let seed = config.reconciliation.clone().validated()?;
    let pool = match init_database(&db_path, &seed).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let reconciliation = load_reconciliation_config(&pool, &seed).await?;
    info!(
        min_tag_length = reconciliation.min_tag_length,
        batch_page_size = reconciliation.batch_page_size,
        "Reconciliation settings loaded"
    );

    let artifacts = Arc::new(FsArtifactStore::new(initializer.artifacts_path()));
    let stores = Stores::sqlite(pool, artifacts);
    let state = AppState::new(stores, EventBus::default(), &reconciliation);
    let app = build_router(state);

    let bind_addr = args.bind.unwrap_or(config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("bagtrack-recon listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
