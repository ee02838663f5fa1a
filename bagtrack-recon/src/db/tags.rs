//! Global tag index
//!
//! A claim is one upsert whose update branch only fires when the stored row
//! already belongs to the claiming flight. Zero affected rows means another
//! flight holds the tag.

use async_trait::async_trait;
use bagtrack_common::time::parse_db_timestamp;
use bagtrack_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use super::{date, page_limit, parse_opt_date, ts, SqliteStore};
use crate::models::{BagTagRecord, ClaimOutcome, TagClaim, Zone};
use crate::store::TagIndex;

fn tag_from_row(row: &SqliteRow) -> Result<BagTagRecord> {
    let zone: Option<i64> = row.try_get("last_seen_zone")?;
    Ok(BagTagRecord {
        tag: row.try_get("tag")?,
        flight_id: row.try_get("flight_id")?,
        flight_number: row.try_get("flight_number")?,
        flight_date: parse_opt_date(row.try_get("flight_date")?)?,
        first_seen_at: parse_db_timestamp(&row.try_get::<String, _>("first_seen_at")?)?,
        last_seen_at: parse_db_timestamp(&row.try_get::<String, _>("last_seen_at")?)?,
        last_seen_location: row.try_get::<String, _>("last_seen_location")?.parse()?,
        last_seen_zone: zone.map(Zone::try_from).transpose()?,
    })
}

async fn fetch_tag(tx: &mut Transaction<'_, Sqlite>, tag: &str) -> Result<Option<BagTagRecord>> {
    let row = sqlx::query("SELECT * FROM bag_tags WHERE tag = ?")
        .bind(tag)
        .fetch_optional(&mut **tx)
        .await?;
    row.as_ref().map(tag_from_row).transpose()
}

#[async_trait]
impl TagIndex for SqliteStore {
    async fn lookup(&self, tag: &str) -> Result<Option<BagTagRecord>> {
        let row = sqlx::query("SELECT * FROM bag_tags WHERE tag = ?")
            .bind(tag)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(tag_from_row).transpose()
    }

    async fn claim(&self, claim: &TagClaim) -> Result<ClaimOutcome> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO bag_tags (
                tag, flight_id, flight_number, flight_date,
                first_seen_at, last_seen_at, last_seen_location, last_seen_zone
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tag) DO UPDATE SET
                flight_number = excluded.flight_number,
                flight_date = excluded.flight_date,
                last_seen_at = excluded.last_seen_at,
                last_seen_location = excluded.last_seen_location,
                last_seen_zone = excluded.last_seen_zone
            WHERE bag_tags.flight_id = excluded.flight_id
            "#,
        )
        .bind(&claim.tag)
        .bind(&claim.flight_id)
        .bind(&claim.flight_number)
        .bind(date(&claim.flight_date))
        .bind(ts(&claim.seen_at))
        .bind(ts(&claim.seen_at))
        .bind(claim.location.as_str())
        .bind(claim.zone.map(|z| i64::from(z.get())))
        .execute(&mut *tx)
        .await?;

        let stored = fetch_tag(&mut tx, &claim.tag).await?;
        tx.commit().await?;

        match stored {
            Some(record) if result.rows_affected() == 1 => Ok(ClaimOutcome::Claimed(record)),
            Some(record) => Ok(ClaimOutcome::HeldBy(record)),
            // Row cannot vanish inside the transaction
            None => Ok(ClaimOutcome::Claimed(claim.to_new_record())),
        }
    }

    async fn reassign(&self, claim: &TagClaim) -> Result<Option<BagTagRecord>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE bag_tags SET
                flight_id = ?,
                flight_number = ?,
                flight_date = ?,
                last_seen_at = ?,
                last_seen_location = ?,
                last_seen_zone = ?
            WHERE tag = ?
            "#,
        )
        .bind(&claim.flight_id)
        .bind(&claim.flight_number)
        .bind(date(&claim.flight_date))
        .bind(ts(&claim.seen_at))
        .bind(claim.location.as_str())
        .bind(claim.zone.map(|z| i64::from(z.get())))
        .bind(&claim.tag)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let stored = fetch_tag(&mut tx, &claim.tag).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn release_unbacked(&self, claim: &TagClaim) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM bag_tags
            WHERE tag = ? AND flight_id = ? AND first_seen_at = ?
              AND NOT EXISTS (
                  SELECT 1 FROM scan_records
                  WHERE scan_records.flight_id = bag_tags.flight_id AND scan_records.tag = bag_tags.tag
              )
            "#,
        )
        .bind(&claim.tag)
        .bind(&claim.flight_id)
        .bind(ts(&claim.seen_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_page(&self, flight_id: &str, limit: usize) -> Result<usize> {
        let result = sqlx::query(
            "DELETE FROM bag_tags WHERE rowid IN (SELECT rowid FROM bag_tags WHERE flight_id = ? LIMIT ?)",
        )
        .bind(flight_id)
        .bind(page_limit(limit))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn count_for_flight(&self, flight_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bag_tags WHERE flight_id = ?")
            .bind(flight_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
