//! Domain models for bag-tag reconciliation

pub mod flight;
pub mod manifest;
pub mod scan;
pub mod tag;

pub use flight::{
    FlightEvent, FlightReport, FlightState, FlightStatus, FlightSummary, NewFlight, TransitionError,
};
pub use manifest::{ImportSummary, ManifestEntry, ManifestSource};
pub use scan::{Checkpoint, IgnoredInput, InsertOutcome, ScanRecord, ScanResult, Zone};
pub use tag::{BagTagRecord, ClaimOutcome, TagClaim};

use bagtrack_common::{Error, Result};
use chrono::NaiveDate;

/// Flight dates are stored and displayed as `YYYY-MM-DD`
pub(crate) const FLIGHT_DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn parse_flight_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), FLIGHT_DATE_FORMAT)
        .map_err(|e| Error::InvalidInput(format!("Invalid flight date '{}': {}", value, e)))
}
