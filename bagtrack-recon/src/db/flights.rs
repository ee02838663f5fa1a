//! Flight documents with revision-guarded updates

use async_trait::async_trait;
use bagtrack_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{date, operator_json, opt_ts, parse_opt_ts, parse_operator_json, ts, SqliteStore};
use crate::models::{parse_flight_date, FlightState};
use crate::store::FlightStore;
use bagtrack_common::time::parse_db_timestamp;

const FLIGHT_COLUMNS: &str = "id, flight_number, flight_date, gate, aircraft_type, status, strict_manifest, \
     checked_bags_total, checked_bags_total_by, aircraft_loading_completed, loading_completed_at, \
     loading_completed_by, aircraft_loaded_bags, reopened_at, reopened_by, created_at, updated_at, revision";

fn flight_from_row(row: &SqliteRow) -> Result<FlightState> {
    let status: String = row.try_get("status")?;
    let checked_total: Option<i64> = row.try_get("checked_bags_total")?;
    let loaded_bags: Option<i64> = row.try_get("aircraft_loaded_bags")?;

    Ok(FlightState {
        id: row.try_get("id")?,
        flight_number: row.try_get("flight_number")?,
        flight_date: parse_flight_date(&row.try_get::<String, _>("flight_date")?)?,
        gate: row.try_get("gate")?,
        aircraft_type: row.try_get("aircraft_type")?,
        status: status.parse()?,
        strict_manifest: row.try_get("strict_manifest")?,
        checked_bags_total: checked_total
            .map(u32::try_from)
            .transpose()
            .map_err(|e| Error::Internal(format!("Stored checked bags total out of range: {}", e)))?,
        checked_bags_total_by: parse_operator_json(row.try_get("checked_bags_total_by")?)?,
        aircraft_loading_completed: row.try_get("aircraft_loading_completed")?,
        loading_completed_at: parse_opt_ts(row.try_get("loading_completed_at")?)?,
        loading_completed_by: parse_operator_json(row.try_get("loading_completed_by")?)?,
        aircraft_loaded_bags: loaded_bags
            .map(u64::try_from)
            .transpose()
            .map_err(|e| Error::Internal(format!("Stored loaded bag count out of range: {}", e)))?,
        reopened_at: parse_opt_ts(row.try_get("reopened_at")?)?,
        reopened_by: parse_operator_json(row.try_get("reopened_by")?)?,
        created_at: parse_db_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_db_timestamp(&row.try_get::<String, _>("updated_at")?)?,
        revision: row.try_get("revision")?,
    })
}

impl SqliteStore {
    /// Single revision-guarded UPDATE, optionally also guarded by the
    /// aircraft ledger size so it serializes with scan inserts
    async fn update_flight(&self, flight: &FlightState, aircraft_scans: Option<u64>) -> Result<bool> {
        let count_guard = if aircraft_scans.is_some() {
            "AND (SELECT COUNT(*) FROM scan_records \
             WHERE scan_records.flight_id = flights.id AND checkpoint = 'aircraft') = ?"
        } else {
            ""
        };
        let sql = format!(
            r#"
            UPDATE flights SET
                flight_number = ?,
                flight_date = ?,
                gate = ?,
                aircraft_type = ?,
                status = ?,
                strict_manifest = ?,
                checked_bags_total = ?,
                checked_bags_total_by = ?,
                aircraft_loading_completed = ?,
                loading_completed_at = ?,
                loading_completed_by = ?,
                aircraft_loaded_bags = ?,
                reopened_at = ?,
                reopened_by = ?,
                updated_at = ?,
                revision = revision + 1
            WHERE id = ? AND revision = ? {}
            "#,
            count_guard
        );

        let mut query = sqlx::query(&sql)
            .bind(&flight.flight_number)
            .bind(date(&flight.flight_date))
            .bind(&flight.gate)
            .bind(&flight.aircraft_type)
            .bind(flight.status.as_str())
            .bind(flight.strict_manifest)
            .bind(flight.checked_bags_total.map(i64::from))
            .bind(operator_json(&flight.checked_bags_total_by)?)
            .bind(flight.aircraft_loading_completed)
            .bind(opt_ts(&flight.loading_completed_at))
            .bind(operator_json(&flight.loading_completed_by)?)
            .bind(flight.aircraft_loaded_bags.map(|n| n as i64))
            .bind(opt_ts(&flight.reopened_at))
            .bind(operator_json(&flight.reopened_by)?)
            .bind(ts(&flight.updated_at))
            .bind(&flight.id)
            .bind(flight.revision);
        if let Some(count) = aircraft_scans {
            query = query.bind(count as i64);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl FlightStore for SqliteStore {
    async fn get(&self, flight_id: &str) -> Result<Option<FlightState>> {
        let row = sqlx::query(&format!("SELECT {} FROM flights WHERE id = ?", FLIGHT_COLUMNS))
            .bind(flight_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(flight_from_row).transpose()
    }

    async fn insert(&self, flight: &FlightState) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO flights (
                id, flight_number, flight_date, gate, aircraft_type, status, strict_manifest,
                checked_bags_total, checked_bags_total_by, aircraft_loading_completed,
                loading_completed_at, loading_completed_by, aircraft_loaded_bags,
                reopened_at, reopened_by, created_at, updated_at, revision
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&flight.id)
        .bind(&flight.flight_number)
        .bind(date(&flight.flight_date))
        .bind(&flight.gate)
        .bind(&flight.aircraft_type)
        .bind(flight.status.as_str())
        .bind(flight.strict_manifest)
        .bind(flight.checked_bags_total.map(i64::from))
        .bind(operator_json(&flight.checked_bags_total_by)?)
        .bind(flight.aircraft_loading_completed)
        .bind(opt_ts(&flight.loading_completed_at))
        .bind(operator_json(&flight.loading_completed_by)?)
        .bind(flight.aircraft_loaded_bags.map(|n| n as i64))
        .bind(opt_ts(&flight.reopened_at))
        .bind(operator_json(&flight.reopened_by)?)
        .bind(ts(&flight.created_at))
        .bind(ts(&flight.updated_at))
        .bind(flight.revision)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn replace_if_revision(&self, flight: &FlightState) -> Result<bool> {
        self.update_flight(flight, None).await
    }

    async fn replace_if_revision_and_count(&self, flight: &FlightState, aircraft_scans: u64) -> Result<bool> {
        self.update_flight(flight, Some(aircraft_scans)).await
    }

    async fn delete(&self, flight_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM flights WHERE id = ?")
            .bind(flight_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Flight {}", flight_id)));
        }
        Ok(())
    }
}
