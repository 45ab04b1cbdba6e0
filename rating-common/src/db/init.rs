//! Database initialization
//!
//! Creates the SQLite file on first run and brings the schema up to date.
//! Every statement is idempotent, so initialization runs on each startup.

use crate::models::FactorId;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Limited to one connection: every SQLite `:memory:` connection is a
/// separate database.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_headers_table(pool).await?;
    create_factor_sets_table(pool).await?;
    record_schema_version(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn record_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the rating_headers table
///
/// Fixed-point columns are TEXT holding canonical 8-place decimal strings.
async fn create_headers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rating_headers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            market TEXT NOT NULL CHECK (market IN ('EQUITY', 'BOND', 'FUND', 'AC', 'BC')),
            origin TEXT NOT NULL DEFAULT '' CHECK (origin IN ('', 'BROKER', 'DEPOSITARY', 'ISSUER')),
            instrument TEXT NOT NULL,
            capital_event TEXT NOT NULL,
            historical_value TEXT NOT NULL DEFAULT '0.00000000',
            payment_date TEXT NOT NULL,
            event_sequence INTEGER NOT NULL CHECK (event_sequence >= 0),
            fiscal_year INTEGER NOT NULL CHECK (fiscal_year >= 0),
            update_factor TEXT NOT NULL DEFAULT '0.00000000',
            is_future_settlement INTEGER NOT NULL DEFAULT 0,
            entered_by_amounts INTEGER NOT NULL DEFAULT 0,
            description TEXT NOT NULL DEFAULT '',
            pending INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rating_headers_year_market_origin \
         ON rating_headers (fiscal_year, market, origin)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rating_headers_instrument ON rating_headers (instrument)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_rating_headers_event \
         ON rating_headers (market, origin, instrument, fiscal_year, event_sequence)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the rating_factor_sets table (one row per header, cascade delete)
async fn create_factor_sets_table(pool: &SqlitePool) -> Result<()> {
    let factor_columns: String = FactorId::ALL
        .iter()
        .map(|id| format!("{} TEXT NOT NULL DEFAULT '0.00000000',\n", id.column()))
        .collect();

    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS rating_factor_sets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            header_id INTEGER NOT NULL UNIQUE
                REFERENCES rating_headers(id) ON DELETE CASCADE,
            {}
            factor_note TEXT NOT NULL DEFAULT ''
        )
        "#,
        factor_columns
    );

    sqlx::query(&sql).execute(pool).await?;

    Ok(())
}
