//! Manifest allow-list storage

use async_trait::async_trait;
use bagtrack_common::time::parse_db_timestamp;
use bagtrack_common::{Operator, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{page_limit, ts, SqliteStore};
use crate::models::{ManifestEntry, ManifestSource};
use crate::store::ManifestStore;

fn entry_from_row(row: &SqliteRow) -> Result<ManifestEntry> {
    let source: Option<String> = row.try_get("source")?;
    Ok(ManifestEntry {
        flight_id: row.try_get("flight_id")?,
        tag: row.try_get("tag")?,
        imported_at: parse_db_timestamp(&row.try_get::<String, _>("imported_at")?)?,
        imported_by: Operator {
            id: row.try_get("imported_by_id")?,
            username: row.try_get("imported_by_username")?,
            role: row.try_get::<String, _>("imported_by_role")?.parse()?,
        },
        source: source.as_deref().map(str::parse::<ManifestSource>).transpose()?,
    })
}

#[async_trait]
impl ManifestStore for SqliteStore {
    async fn contains(&self, flight_id: &str, tag: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM manifest_entries WHERE flight_id = ? AND tag = ?")
                .bind(flight_id)
                .bind(tag)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn upsert_page(&self, entries: &[ManifestEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO manifest_entries (
                    flight_id, tag, imported_at,
                    imported_by_id, imported_by_username, imported_by_role, source
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(flight_id, tag) DO UPDATE SET
                    imported_at = excluded.imported_at,
                    imported_by_id = excluded.imported_by_id,
                    imported_by_username = excluded.imported_by_username,
                    imported_by_role = excluded.imported_by_role,
                    source = excluded.source
                "#,
            )
            .bind(&entry.flight_id)
            .bind(&entry.tag)
            .bind(ts(&entry.imported_at))
            .bind(&entry.imported_by.id)
            .bind(&entry.imported_by.username)
            .bind(entry.imported_by.role.as_str())
            .bind(entry.source.map(|s| s.as_str()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, flight_id: &str) -> Result<Vec<ManifestEntry>> {
        let rows = sqlx::query("SELECT * FROM manifest_entries WHERE flight_id = ? ORDER BY tag")
            .bind(flight_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn count(&self, flight_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM manifest_entries WHERE flight_id = ?")
            .bind(flight_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn delete_page(&self, flight_id: &str, limit: usize) -> Result<usize> {
        let result = sqlx::query(
            "DELETE FROM manifest_entries WHERE rowid IN \
             (SELECT rowid FROM manifest_entries WHERE flight_id = ? LIMIT ?)",
        )
        .bind(flight_id)
        .bind(page_limit(limit))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }
}
