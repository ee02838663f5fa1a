//! Unit tests for database initialization
//!
//! Covers automatic database creation, idempotent re-initialization, default
//! settings, and the constraints the scan ledger relies on.

use bagtrack_common::config::ReconciliationConfig;
use bagtrack_common::db::{
    get_setting, init_database, init_memory_database, load_reconciliation_config, set_setting,
    BATCH_PAGE_SIZE, MIN_TAG_LENGTH,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("sub").join("bagtrack.db");

    let result = init_database(&db_path, &ReconciliationConfig::default()).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("bagtrack.db");
    let defaults = ReconciliationConfig::default();

    let pool1 = init_database(&db_path, &defaults).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path, &defaults).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let pool = init_memory_database(&ReconciliationConfig::default()).await.unwrap();

    assert_eq!(get_setting(&pool, MIN_TAG_LENGTH).await.unwrap().as_deref(), Some("6"));
    assert_eq!(get_setting(&pool, BATCH_PAGE_SIZE).await.unwrap().as_deref(), Some("400"));

    let loaded = load_reconciliation_config(&pool, &ReconciliationConfig::default())
        .await
        .unwrap();
    assert_eq!(loaded, ReconciliationConfig::default());
}

#[tokio::test]
async fn test_database_value_wins_over_toml_seed() {
    let pool = init_memory_database(&ReconciliationConfig::default()).await.unwrap();
    set_setting(&pool, MIN_TAG_LENGTH, "9").await.unwrap();

    // Re-seeding with different defaults must not overwrite the stored value
    let seed = ReconciliationConfig {
        min_tag_length: 7,
        ..ReconciliationConfig::default()
    };
    bagtrack_common::db::init_default_settings(&pool, &seed).await.unwrap();

    let loaded = load_reconciliation_config(&pool, &seed).await.unwrap();
    assert_eq!(loaded.min_tag_length, 9);
}

#[tokio::test]
async fn test_null_setting_reset_to_default() {
    let pool = init_memory_database(&ReconciliationConfig::default()).await.unwrap();
    sqlx::query("UPDATE settings SET value = NULL WHERE key = ?")
        .bind(BATCH_PAGE_SIZE)
        .execute(&pool)
        .await
        .unwrap();

    bagtrack_common::db::init_default_settings(&pool, &ReconciliationConfig::default())
        .await
        .unwrap();

    assert_eq!(get_setting(&pool, BATCH_PAGE_SIZE).await.unwrap().as_deref(), Some("400"));
}

#[tokio::test]
async fn test_invalid_setting_value_is_config_error() {
    let pool = init_memory_database(&ReconciliationConfig::default()).await.unwrap();
    set_setting(&pool, MIN_TAG_LENGTH, "six").await.unwrap();

    let result = load_reconciliation_config(&pool, &ReconciliationConfig::default()).await;
    assert!(matches!(result, Err(bagtrack_common::Error::Config(_))));
}

#[tokio::test]
async fn test_scan_records_reject_second_insert() {
    let pool = init_memory_database(&ReconciliationConfig::default()).await.unwrap();
    let insert = r#"
        INSERT INTO scan_records (flight_id, checkpoint, tag, created_at, scanned_by_id,
                                  scanned_by_username, scanned_by_role, zone)
        VALUES ('F1', 'aircraft', '123456', '2025-01-15T10:00:00.000000Z', 'u1', 'ana', 'ramp_agent', 2)
        ON CONFLICT DO NOTHING
    "#;

    let first = sqlx::query(insert).execute(&pool).await.unwrap().rows_affected();
    let second = sqlx::query(insert).execute(&pool).await.unwrap().rows_affected();

    assert_eq!(first, 1);
    assert_eq!(second, 0);
}

#[tokio::test]
async fn test_scan_records_zone_must_match_checkpoint() {
    let pool = init_memory_database(&ReconciliationConfig::default()).await.unwrap();

    let result = sqlx::query(
        r#"
        INSERT INTO scan_records (flight_id, checkpoint, tag, created_at, scanned_by_id,
                                  scanned_by_username, scanned_by_role, zone)
        VALUES ('F1', 'bagroom', '123456', '2025-01-15T10:00:00.000000Z', 'u1', 'ana', 'bagroom_agent', 3)
        "#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "bagroom scans must not carry a zone");
}
