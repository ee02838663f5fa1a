//! Scan ledger storage
//!
//! The (flight_id, checkpoint, tag) primary key makes `insert_new` a
//! create-only write: the losing insert affects zero rows and reads back the
//! winner inside the same transaction. The insert also selects nothing while
//! the flight is locked, so it cannot land after a completion write.

use async_trait::async_trait;
use bagtrack_common::time::parse_db_timestamp;
use bagtrack_common::{Operator, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;

use super::{page_limit, ts, SqliteStore};
use crate::models::{Checkpoint, InsertOutcome, ScanRecord, Zone};
use crate::store::{empty_zone_counts, ScanLedger};

const SELECT_SCAN: &str = "SELECT flight_id, checkpoint, tag, created_at, scanned_by_id, \
     scanned_by_username, scanned_by_role, zone FROM scan_records";

fn scan_from_row(row: &SqliteRow) -> Result<ScanRecord> {
    let zone: Option<i64> = row.try_get("zone")?;
    Ok(ScanRecord {
        flight_id: row.try_get("flight_id")?,
        checkpoint: row.try_get::<String, _>("checkpoint")?.parse()?,
        tag: row.try_get("tag")?,
        created_at: parse_db_timestamp(&row.try_get::<String, _>("created_at")?)?,
        scanned_by: Operator {
            id: row.try_get("scanned_by_id")?,
            username: row.try_get("scanned_by_username")?,
            role: row.try_get::<String, _>("scanned_by_role")?.parse()?,
        },
        zone: zone.map(Zone::try_from).transpose()?,
    })
}

#[async_trait]
impl ScanLedger for SqliteStore {
    async fn find(&self, flight_id: &str, checkpoint: Checkpoint, tag: &str) -> Result<Option<ScanRecord>> {
        let row = sqlx::query(&format!(
            "{} WHERE flight_id = ? AND checkpoint = ? AND tag = ?",
            SELECT_SCAN
        ))
        .bind(flight_id)
        .bind(checkpoint.as_str())
        .bind(tag)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(scan_from_row).transpose()
    }

    async fn insert_new(&self, record: &ScanRecord) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO scan_records (
                flight_id, checkpoint, tag, created_at,
                scanned_by_id, scanned_by_username, scanned_by_role, zone
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM flights
                WHERE id = ? AND (status = 'LOADED' OR aircraft_loading_completed = 1)
            )
            ON CONFLICT(flight_id, checkpoint, tag) DO NOTHING
            "#,
        )
        .bind(&record.flight_id)
        .bind(record.checkpoint.as_str())
        .bind(&record.tag)
        .bind(ts(&record.created_at))
        .bind(&record.scanned_by.id)
        .bind(&record.scanned_by.username)
        .bind(record.scanned_by.role.as_str())
        .bind(record.zone.map(|z| i64::from(z.get())))
        .bind(&record.flight_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 1 {
            tx.commit().await?;
            return Ok(InsertOutcome::Inserted);
        }

        let row = sqlx::query(&format!(
            "{} WHERE flight_id = ? AND checkpoint = ? AND tag = ?",
            SELECT_SCAN
        ))
        .bind(&record.flight_id)
        .bind(record.checkpoint.as_str())
        .bind(&record.tag)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        match row {
            Some(row) => Ok(InsertOutcome::AlreadyExists(scan_from_row(&row)?)),
            None => Ok(InsertOutcome::FlightLocked),
        }
    }

    async fn list(&self, flight_id: &str, checkpoint: Checkpoint) -> Result<Vec<ScanRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE flight_id = ? AND checkpoint = ? ORDER BY created_at DESC, rowid DESC",
            SELECT_SCAN
        ))
        .bind(flight_id)
        .bind(checkpoint.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(scan_from_row).collect()
    }

    async fn count(&self, flight_id: &str, checkpoint: Checkpoint) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scan_records WHERE flight_id = ? AND checkpoint = ?")
                .bind(flight_id)
                .bind(checkpoint.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn count_by_zone(&self, flight_id: &str) -> Result<BTreeMap<Zone, u64>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT zone, COUNT(*) FROM scan_records
            WHERE flight_id = ? AND checkpoint = 'aircraft' AND zone IS NOT NULL
            GROUP BY zone
            "#,
        )
        .bind(flight_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = empty_zone_counts();
        for (zone, count) in rows {
            counts.insert(Zone::try_from(zone)?, count as u64);
        }
        Ok(counts)
    }

    async fn delete_page(&self, flight_id: &str, limit: usize) -> Result<usize> {
        let result = sqlx::query(
            "DELETE FROM scan_records WHERE rowid IN \
             (SELECT rowid FROM scan_records WHERE flight_id = ? LIMIT ?)",
        )
        .bind(flight_id)
        .bind(page_limit(limit))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }
}
