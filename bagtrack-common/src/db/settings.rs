//! Runtime settings stored in the `settings` table
//!
//! The database is authoritative once a value exists; TOML values only seed
//! missing or NULL rows.

use crate::config::ReconciliationConfig;
use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

pub const MIN_TAG_LENGTH: &str = "min_tag_length";
pub const MANIFEST_MIN_TAG_LENGTH: &str = "manifest_min_tag_length";
pub const MANIFEST_MAX_TAG_LENGTH: &str = "manifest_max_tag_length";
pub const BATCH_PAGE_SIZE: &str = "batch_page_size";
pub const STATUS_UPDATE_MAX_ATTEMPTS: &str = "status_update_max_attempts";

/// Create the settings table
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Seed every reconciliation setting that is missing or NULL
pub async fn init_default_settings(pool: &SqlitePool, defaults: &ReconciliationConfig) -> Result<()> {
    ensure_setting(pool, MIN_TAG_LENGTH, &defaults.min_tag_length.to_string()).await?;
    ensure_setting(pool, MANIFEST_MIN_TAG_LENGTH, &defaults.manifest_min_tag_length.to_string()).await?;
    ensure_setting(pool, MANIFEST_MAX_TAG_LENGTH, &defaults.manifest_max_tag_length.to_string()).await?;
    ensure_setting(pool, BATCH_PAGE_SIZE, &defaults.batch_page_size.to_string()).await?;
    ensure_setting(
        pool,
        STATUS_UPDATE_MAX_ATTEMPTS,
        &defaults.status_update_max_attempts.to_string(),
    )
    .await?;

    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// Creates the row if missing and resets it if the stored value is NULL.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE: several services may start against the same file
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if reset > 0 {
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

/// Read a setting's raw value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value.flatten())
}

/// Write a setting's raw value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

async fn get_parsed<T: std::str::FromStr>(pool: &SqlitePool, key: &str, fallback: T) -> Result<T> {
    match get_setting(pool, key).await? {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("Setting '{}' has invalid value '{}'", key, raw))),
        None => Ok(fallback),
    }
}

/// Load reconciliation settings, using `fallback` for any row that is absent
pub async fn load_reconciliation_config(
    pool: &SqlitePool,
    fallback: &ReconciliationConfig,
) -> Result<ReconciliationConfig> {
    let config = ReconciliationConfig {
        min_tag_length: get_parsed(pool, MIN_TAG_LENGTH, fallback.min_tag_length).await?,
        manifest_min_tag_length: get_parsed(pool, MANIFEST_MIN_TAG_LENGTH, fallback.manifest_min_tag_length)
            .await?,
        manifest_max_tag_length: get_parsed(pool, MANIFEST_MAX_TAG_LENGTH, fallback.manifest_max_tag_length)
            .await?,
        batch_page_size: get_parsed(pool, BATCH_PAGE_SIZE, fallback.batch_page_size).await?,
        status_update_max_attempts: get_parsed(
            pool,
            STATUS_UPDATE_MAX_ATTEMPTS,
            fallback.status_update_max_attempts,
        )
        .await?,
    };

    config.validated()
}
