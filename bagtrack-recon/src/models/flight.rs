//! Flight lifecycle state machine
//!
//! A flight progresses OPEN → RECEIVING → LOADING → LOADED:
//! - the first accepted bagroom scan moves OPEN to RECEIVING
//! - the first accepted aircraft scan moves anything short of LOADED to LOADING
//! - only the completion command reaches LOADED, and only when the aircraft
//!   scan count equals the checked-bags total entered at the gate
//! - only a manager reopen leaves LOADED (back to LOADING)
//!
//! Status never regresses otherwise. Re-applying any scan event is a no-op.

use bagtrack_common::Operator;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::scan::{Checkpoint, Zone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlightStatus {
    /// Created, nothing scanned yet
    Open,
    /// Bags arriving in the bagroom
    Receiving,
    /// Bags going into the holds
    Loading,
    /// Loading completed and verified against the gate total
    Loaded,
}

/// Inputs to the status transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightEvent {
    BagroomScan,
    AircraftScan,
    CompleteLoading,
    Reopen,
}

impl FlightEvent {
    pub fn for_checkpoint(checkpoint: Checkpoint) -> Self {
        match checkpoint {
            Checkpoint::Bagroom => FlightEvent::BagroomScan,
            Checkpoint::Aircraft => FlightEvent::AircraftScan,
        }
    }
}

impl FlightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Open => "OPEN",
            FlightStatus::Receiving => "RECEIVING",
            FlightStatus::Loading => "LOADING",
            FlightStatus::Loaded => "LOADED",
        }
    }

    /// Transition table
    ///
    /// Completion preconditions (gate total, bag count) live on
    /// [`FlightState::complete_loading`]; this table only covers status.
    pub fn next(self, event: FlightEvent) -> Result<FlightStatus, TransitionError> {
        use FlightEvent::*;
        use FlightStatus::*;

        match (self, event) {
            (Open | Receiving, BagroomScan) => Ok(Receiving),
            (Loading | Loaded, BagroomScan) => Ok(self),
            (Open | Receiving | Loading, AircraftScan) => Ok(Loading),
            (Loaded, AircraftScan) => Ok(Loaded),
            (_, CompleteLoading) => Ok(Loaded),
            (Loaded, Reopen) => Ok(Loading),
            (status, Reopen) => Err(TransitionError::NotLoaded { status }),
        }
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlightStatus {
    type Err = bagtrack_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(FlightStatus::Open),
            "RECEIVING" => Ok(FlightStatus::Receiving),
            "LOADING" => Ok(FlightStatus::Loading),
            "LOADED" => Ok(FlightStatus::Loaded),
            other => Err(bagtrack_common::Error::Internal(format!("Unknown flight status: '{}'", other))),
        }
    }
}

/// Refused status command; recoverable and shown to the operator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Checked bags total has not been entered at the gate")]
    MissingGateTotal,

    #[error("{missing} bag(s) missing: {scanned} loaded of {expected} checked")]
    BagsMissing { missing: u64, expected: u64, scanned: u64 },

    #[error("{excess} bag(s) more than checked: {scanned} loaded of {expected} checked")]
    ExcessBags { excess: u64, expected: u64, scanned: u64 },

    #[error("Only LOADED flights can be reopened (flight is {status})")]
    NotLoaded { status: FlightStatus },
}

/// Number and date of a flight, for operator display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightSummary {
    pub flight_id: String,
    pub flight_number: Option<String>,
    pub flight_date: Option<NaiveDate>,
}

impl fmt::Display for FlightSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let number = self.flight_number.as_deref().unwrap_or(&self.flight_id);
        match self.flight_date {
            Some(date) => write!(f, "{} ({})", number, date),
            None => write!(f, "{} (no date)", number),
        }
    }
}

/// Request to create a flight
#[derive(Debug, Clone, Deserialize)]
pub struct NewFlight {
    /// Caller-chosen identifier; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub flight_number: String,
    pub flight_date: NaiveDate,
    #[serde(default)]
    pub gate: Option<String>,
    #[serde(default)]
    pub aircraft_type: Option<String>,
}

/// Persistent state of one flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightState {
    pub id: String,
    pub flight_number: String,
    pub flight_date: NaiveDate,
    pub gate: Option<String>,
    pub aircraft_type: Option<String>,
    pub status: FlightStatus,
    pub strict_manifest: bool,
    /// Ground-truth count entered at the gate counter
    pub checked_bags_total: Option<u32>,
    pub checked_bags_total_by: Option<Operator>,
    pub aircraft_loading_completed: bool,
    pub loading_completed_at: Option<DateTime<Utc>>,
    pub loading_completed_by: Option<Operator>,
    /// Aircraft scan count at the moment of completion
    pub aircraft_loaded_bags: Option<u64>,
    pub reopened_at: Option<DateTime<Utc>>,
    pub reopened_by: Option<Operator>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every successful update
    pub revision: i64,
}

impl FlightState {
    pub fn new(id: String, request: NewFlight, now: DateTime<Utc>) -> Self {
        Self {
            id,
            flight_number: request.flight_number.trim().to_string(),
            flight_date: request.flight_date,
            gate: request.gate,
            aircraft_type: request.aircraft_type,
            status: FlightStatus::Open,
            strict_manifest: false,
            checked_bags_total: None,
            checked_bags_total_by: None,
            aircraft_loading_completed: false,
            loading_completed_at: None,
            loading_completed_by: None,
            aircraft_loaded_bags: None,
            reopened_at: None,
            reopened_by: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Bagroom and aircraft scanning are refused once loading is complete
    pub fn is_locked(&self) -> bool {
        self.status == FlightStatus::Loaded || self.aircraft_loading_completed
    }

    pub fn summary(&self) -> FlightSummary {
        FlightSummary {
            flight_id: self.id.clone(),
            flight_number: Some(self.flight_number.clone()),
            flight_date: Some(self.flight_date),
        }
    }

    /// Advance status for an accepted scan; returns true if status changed
    pub fn apply_scan(&mut self, checkpoint: Checkpoint) -> bool {
        let event = FlightEvent::for_checkpoint(checkpoint);
        // Scan events are total in the table
        let next = self.status.next(event).unwrap_or(self.status);
        let changed = next != self.status;
        self.status = next;
        changed
    }

    /// Mark loading complete
    ///
    /// Requires the gate total and an exact match with `aircraft_scans`.
    /// Returns `Ok(false)` if the flight was already completed.
    pub fn complete_loading(
        &mut self,
        aircraft_scans: u64,
        operator: &Operator,
        now: DateTime<Utc>,
    ) -> Result<bool, TransitionError> {
        if self.status == FlightStatus::Loaded && self.aircraft_loading_completed {
            return Ok(false);
        }

        let expected = u64::from(self.checked_bags_total.ok_or(TransitionError::MissingGateTotal)?);
        if aircraft_scans < expected {
            return Err(TransitionError::BagsMissing {
                missing: expected - aircraft_scans,
                expected,
                scanned: aircraft_scans,
            });
        }
        if aircraft_scans > expected {
            return Err(TransitionError::ExcessBags {
                excess: aircraft_scans - expected,
                expected,
                scanned: aircraft_scans,
            });
        }

        self.status = self.status.next(FlightEvent::CompleteLoading)?;
        self.aircraft_loading_completed = true;
        self.loading_completed_at = Some(now);
        self.loading_completed_by = Some(operator.clone());
        self.aircraft_loaded_bags = Some(aircraft_scans);
        Ok(true)
    }

    /// Return a LOADED flight to LOADING and clear completion metadata
    pub fn reopen(&mut self, operator: &Operator, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.status = self.status.next(FlightEvent::Reopen)?;
        self.aircraft_loading_completed = false;
        self.loading_completed_at = None;
        self.loading_completed_by = None;
        self.aircraft_loaded_bags = None;
        self.reopened_at = Some(now);
        self.reopened_by = Some(operator.clone());
        Ok(())
    }
}

/// Flight state plus scan tallies, for dashboards and reports
#[derive(Debug, Clone, Serialize)]
pub struct FlightReport {
    pub flight: FlightState,
    pub bagroom_scans: u64,
    pub aircraft_scans: u64,
    pub aircraft_by_zone: BTreeMap<Zone, u64>,
    pub manifest_size: u64,
    /// Checked total minus aircraft scans, when the total is known
    pub missing: Option<i64>,
}
