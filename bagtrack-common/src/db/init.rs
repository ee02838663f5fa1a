//! Database initialization
//!
//! Creates the database on first run and brings the schema up to date.
//! Every statement is idempotent, so this runs on every startup.

use crate::config::ReconciliationConfig;
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Open (creating if needed) the database file and initialize the schema
pub async fn init_database(db_path: &Path, defaults: &ReconciliationConfig) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets scanners read while another operator's scan commits
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool, defaults).await?;

    Ok(pool)
}

/// Single-connection in-memory database, for tests and dry runs
///
/// An in-memory SQLite database lives per connection, so the pool is capped
/// at one connection to keep every query on the same database.
pub async fn init_memory_database(defaults: &ReconciliationConfig) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_schema(&pool, defaults).await?;
    Ok(pool)
}

/// Create all tables and seed default settings
pub async fn init_schema(pool: &SqlitePool, defaults: &ReconciliationConfig) -> Result<()> {
    create_schema_version_table(pool).await?;
    crate::db::settings::create_settings_table(pool).await?;
    create_flights_table(pool).await?;
    create_bag_tags_table(pool).await?;
    create_manifest_entries_table(pool).await?;
    create_scan_records_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    crate::db::settings::init_default_settings(pool, defaults).await?;

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

/// Create the flights table
///
/// One row per flight. `revision` is bumped on every update and guards
/// compare-and-swap writes from concurrent operators.
pub async fn create_flights_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flights (
            id TEXT PRIMARY KEY,
            flight_number TEXT NOT NULL,
            flight_date TEXT NOT NULL,
            gate TEXT,
            aircraft_type TEXT,
            status TEXT NOT NULL DEFAULT 'OPEN' CHECK (status IN ('OPEN', 'RECEIVING', 'LOADING', 'LOADED')),
            strict_manifest INTEGER NOT NULL DEFAULT 0,
            checked_bags_total INTEGER CHECK (checked_bags_total IS NULL OR checked_bags_total >= 0),
            checked_bags_total_by TEXT,
            aircraft_loading_completed INTEGER NOT NULL DEFAULT 0,
            loading_completed_at TEXT,
            loading_completed_by TEXT,
            aircraft_loaded_bags INTEGER,
            reopened_at TEXT,
            reopened_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            revision INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_flights_number_date ON flights(flight_number, flight_date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the global bag tag index
///
/// Keyed by tag alone: a tag is claimed by at most one flight.
pub async fn create_bag_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bag_tags (
            tag TEXT PRIMARY KEY,
            flight_id TEXT NOT NULL,
            flight_number TEXT,
            flight_date TEXT,
            first_seen_at TEXT NOT NULL,
            last_seen_at TEXT NOT NULL,
            last_seen_location TEXT NOT NULL CHECK (last_seen_location IN ('bagroom', 'aircraft')),
            last_seen_zone INTEGER CHECK (last_seen_zone IS NULL OR (last_seen_zone BETWEEN 1 AND 4))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bag_tags_flight ON bag_tags(flight_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the per-flight manifest allow-list
pub async fn create_manifest_entries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS manifest_entries (
            flight_id TEXT NOT NULL,
            tag TEXT NOT NULL,
            imported_at TEXT NOT NULL,
            imported_by_id TEXT NOT NULL,
            imported_by_username TEXT NOT NULL,
            imported_by_role TEXT NOT NULL,
            source TEXT CHECK (source IS NULL OR source IN ('manual', 'ocr')),
            PRIMARY KEY (flight_id, tag)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the scan ledger
///
/// The composite primary key is the create-only guard: a second insert for
/// the same (flight, checkpoint, tag) affects zero rows.
pub async fn create_scan_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_records (
            flight_id TEXT NOT NULL,
            checkpoint TEXT NOT NULL CHECK (checkpoint IN ('bagroom', 'aircraft')),
            tag TEXT NOT NULL,
            created_at TEXT NOT NULL,
            scanned_by_id TEXT NOT NULL,
            scanned_by_username TEXT NOT NULL,
            scanned_by_role TEXT NOT NULL,
            zone INTEGER CHECK (zone IS NULL OR (zone BETWEEN 1 AND 4)),
            PRIMARY KEY (flight_id, checkpoint, tag),
            CHECK ((checkpoint = 'aircraft') = (zone IS NOT NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scan_records_recent ON scan_records(flight_id, checkpoint, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
