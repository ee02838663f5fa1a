//! SQLite backend for the reconciliation stores
//!
//! Schema lives in `bagtrack_common::db::init`. Timestamps are RFC 3339 text,
//! flight dates are `YYYY-MM-DD` text, operators in flight columns are JSON.

use bagtrack_common::time::{parse_db_timestamp, to_db_string};
use bagtrack_common::{Error, Operator, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::models::{parse_flight_date, FLIGHT_DATE_FORMAT};

mod flights;
mod manifests;
mod scans;
mod tags;

/// One pool serving all four store traits
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts(value: &DateTime<Utc>) -> String {
    to_db_string(value)
}

fn opt_ts(value: &Option<DateTime<Utc>>) -> Option<String> {
    value.as_ref().map(to_db_string)
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_db_timestamp).transpose()
}

fn date(value: &NaiveDate) -> String {
    value.format(FLIGHT_DATE_FORMAT).to_string()
}

fn parse_opt_date(value: Option<String>) -> Result<Option<NaiveDate>> {
    value.as_deref().map(parse_flight_date).transpose()
}

fn operator_json(value: &Option<Operator>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(|op| {
            serde_json::to_string(op)
                .map_err(|e| Error::Internal(format!("Failed to encode operator: {}", e)))
        })
        .transpose()
}

fn parse_operator_json(value: Option<String>) -> Result<Option<Operator>> {
    value
        .as_deref()
        .map(|raw| {
            serde_json::from_str(raw)
                .map_err(|e| Error::Internal(format!("Stored operator is invalid: {}", e)))
        })
        .transpose()
}

/// Bind value for page-bounded statements
fn page_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
