//! rating-ingest - bulk upload service for rating factor files
//!
//! Accepts CSV uploads of capital-event headers with their thirty factors,
//! previews validation results, and commits confirmed rows to the rating
//! database.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rating_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use rating_common::db::init_database;
use rating_ingest::{build_router, AppState};
use tracing::{error, info};

const DEFAULT_BIND: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5730;

#[derive(Debug, Parser)]
#[command(name = "rating-ingest", version, about = "Bulk ingestion service for rating factors")]
struct Args {
    /// Root folder holding ratings.db
    #[arg(long, env = "RATING_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "RATING_BIND")]
    bind: Option<String>,

    /// Port to listen on
    #[arg(long, env = "RATING_PORT")]
    port: Option<u16>,

    /// Explicit config.toml path
    #[arg(long, env = "RATING_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load_or_default(args.config.as_deref());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Build identification first, before any database delay
    info!(
        "Starting rating-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new("rating-ingest")
        .with_cli_arg(args.root_folder)
        .with_toml(&config)
        .resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = match init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    info!(
        staging_ttl_secs = config.ingest.staging_ttl_secs,
        results_ttl_secs = config.ingest.results_ttl_secs,
        commit_timeout_ms = config.ingest.commit_timeout_ms,
        max_upload_bytes = config.ingest.max_upload_bytes,
        normalize_workers = config.ingest.normalize_workers,
        "Ingest settings"
    );

    let state = AppState::new(pool, config.ingest.clone());
    let app = build_router(state);

    let bind = args.bind.or(config.bind).unwrap_or_else(|| DEFAULT_BIND.to_string());
    let port = args.port.or(config.port).unwrap_or(DEFAULT_PORT);
    let address = format!("{}:{}", bind, port);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!("rating-ingest listening on http://{}", address);
    info!("Health check: http://{}/health", address);

    axum::serve(listener, app).await?;

    Ok(())
}
