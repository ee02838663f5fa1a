//! Flight status commands and queries
//!
//! All writes go through a revision compare-and-swap loop: read the flight,
//! apply the transition in memory, write only if nobody else wrote first.

use bagtrack_common::config::ReconciliationConfig;
use bagtrack_common::{time, Operator};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::require;
use crate::error::{ReconError, ReconResult};
use crate::events::{BagEvent, EventBus};
use crate::models::{Checkpoint, FlightReport, FlightState, FlightStatus, NewFlight, TransitionError};
use crate::store::Stores;

#[derive(Clone)]
pub struct FlightStatusMachine {
    stores: Stores,
    events: EventBus,
    max_attempts: u32,
}

impl FlightStatusMachine {
    pub fn new(stores: Stores, events: EventBus, config: &ReconciliationConfig) -> Self {
        Self {
            stores,
            events,
            max_attempts: config.status_update_max_attempts.max(1),
        }
    }

    /// Create an OPEN flight
    pub async fn create_flight(&self, request: NewFlight, operator: &Operator) -> ReconResult<FlightState> {
        if request.flight_number.trim().is_empty() {
            return Err(ReconError::InvalidInput("Flight number is required".to_string()));
        }

        let id = match request.id.as_deref().map(str::trim) {
            Some("") => return Err(ReconError::InvalidInput("Flight id must not be blank".to_string())),
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let flight = FlightState::new(id, request, time::now());
        if !self.stores.flights.insert(&flight).await? {
            return Err(ReconError::InvalidInput(format!("Flight {} already exists", flight.id)));
        }

        info!(
            flight_id = %flight.id,
            flight_number = %flight.flight_number,
            flight_date = %flight.flight_date,
            created_by = %operator.username,
            "Flight created"
        );
        Ok(flight)
    }

    pub async fn get_flight(&self, flight_id: &str) -> ReconResult<FlightState> {
        self.stores
            .flights
            .get(flight_id)
            .await?
            .ok_or_else(|| ReconError::FlightNotFound(flight_id.to_string()))
    }

    /// Auto-advance after an accepted scan at `checkpoint`
    pub async fn record_scan(&self, flight_id: &str, checkpoint: Checkpoint) -> ReconResult<FlightState> {
        self.update(flight_id, |flight| Ok(flight.apply_scan(checkpoint))).await
    }

    pub async fn record_bagroom_scan(&self, flight_id: &str) -> ReconResult<FlightState> {
        self.record_scan(flight_id, Checkpoint::Bagroom).await
    }

    pub async fn record_aircraft_scan(&self, flight_id: &str) -> ReconResult<FlightState> {
        self.record_scan(flight_id, Checkpoint::Aircraft).await
    }

    /// Mark aircraft loading complete
    ///
    /// Fails with `PreconditionFailed` when the gate total is missing or the
    /// aircraft scan count differs from it. The write only lands if the
    /// aircraft ledger still holds the counted records; a scan accepted in
    /// between forces a retry, which re-reads the count.
    pub async fn complete_loading(&self, flight_id: &str, operator: &Operator) -> ReconResult<FlightState> {
        require(operator, operator.role.can_complete(), "complete loading")?;

        for attempt in 1..=self.max_attempts {
            let mut flight = self.get_flight(flight_id).await?;
            let before = flight.status;
            let aircraft_scans = self.stores.scans.count(flight_id, Checkpoint::Aircraft).await?;

            match flight.complete_loading(aircraft_scans, operator, time::now()) {
                Ok(false) => return Ok(flight),
                Ok(true) => {}
                Err(err) => {
                    info!(flight_id = %flight_id, aircraft_scans, "Completion refused: {}", err);
                    return Err(err.into());
                }
            }

            if self.commit(&mut flight, before, Some(aircraft_scans)).await? {
                info!(
                    flight_id = %flight_id,
                    aircraft_loaded_bags = aircraft_scans,
                    completed_by = %operator.username,
                    "Aircraft loading completed"
                );
                return Ok(flight);
            }
            debug!(flight_id = %flight_id, attempt, "Flight revision changed, retrying completion");
        }

        warn!(flight_id = %flight_id, attempts = self.max_attempts, "Completion gave up under contention");
        Err(ReconError::Contention(flight_id.to_string()))
    }

    /// Return a LOADED flight to LOADING
    pub async fn reopen(&self, flight_id: &str, operator: &Operator) -> ReconResult<FlightState> {
        require(operator, operator.role.can_reopen(), "reopen flights")?;

        let now = time::now();
        let flight = self
            .update(flight_id, |flight| flight.reopen(operator, now).map(|_| true))
            .await?;

        info!(flight_id = %flight_id, reopened_by = %operator.username, "Flight reopened");
        Ok(flight)
    }

    /// Record the checked-bags total entered at the gate
    ///
    /// Gate input stays editable after completion.
    pub async fn set_checked_bags_total(
        &self,
        flight_id: &str,
        total: u32,
        operator: &Operator,
    ) -> ReconResult<FlightState> {
        require(operator, operator.role.can_edit_gate_total(), "set the checked bags total")?;

        let flight = self
            .update(flight_id, |flight| {
                if flight.checked_bags_total == Some(total) {
                    return Ok(false);
                }
                flight.checked_bags_total = Some(total);
                flight.checked_bags_total_by = Some(operator.clone());
                Ok(true)
            })
            .await?;

        info!(flight_id = %flight_id, total, set_by = %operator.username, "Checked bags total set");
        Ok(flight)
    }

    pub async fn set_strict_manifest(
        &self,
        flight_id: &str,
        enabled: bool,
        operator: &Operator,
    ) -> ReconResult<FlightState> {
        require(operator, operator.role.can_edit_manifest(), "change strict manifest mode")?;

        let flight = self
            .update(flight_id, |flight| {
                let changed = flight.strict_manifest != enabled;
                flight.strict_manifest = enabled;
                Ok(changed)
            })
            .await?;

        info!(flight_id = %flight_id, enabled, set_by = %operator.username, "Strict manifest mode set");
        Ok(flight)
    }

    /// Flight state with scan and manifest tallies
    pub async fn flight_report(&self, flight_id: &str) -> ReconResult<FlightReport> {
        let flight = self.get_flight(flight_id).await?;
        let bagroom_scans = self.stores.scans.count(flight_id, Checkpoint::Bagroom).await?;
        let aircraft_scans = self.stores.scans.count(flight_id, Checkpoint::Aircraft).await?;
        let aircraft_by_zone = self.stores.scans.count_by_zone(flight_id).await?;
        let manifest_size = self.stores.manifests.count(flight_id).await?;
        let missing = flight
            .checked_bags_total
            .map(|total| i64::from(total) - aircraft_scans as i64);

        Ok(FlightReport {
            flight,
            bagroom_scans,
            aircraft_scans,
            aircraft_by_zone,
            manifest_size,
            missing,
        })
    }

    /// Read-modify-write with revision compare-and-swap
    ///
    /// `apply` returns whether it changed anything; unchanged flights are
    /// returned without a write.
    async fn update<F>(&self, flight_id: &str, mut apply: F) -> ReconResult<FlightState>
    where
        F: FnMut(&mut FlightState) -> Result<bool, TransitionError>,
    {
        for attempt in 1..=self.max_attempts {
            let mut flight = self.get_flight(flight_id).await?;
            let before = flight.status;

            if !apply(&mut flight)? {
                return Ok(flight);
            }
            if self.commit(&mut flight, before, None).await? {
                return Ok(flight);
            }
            debug!(flight_id = %flight_id, attempt, "Flight revision changed, retrying update");
        }

        warn!(flight_id = %flight_id, attempts = self.max_attempts, "Flight update gave up under contention");
        Err(ReconError::Contention(flight_id.to_string()))
    }

    /// Write `flight` if its revision is current and, when given, the
    /// aircraft ledger size is unchanged; announce any status change
    async fn commit(
        &self,
        flight: &mut FlightState,
        before: FlightStatus,
        aircraft_scans: Option<u64>,
    ) -> ReconResult<bool> {
        flight.updated_at = time::now();
        let written = match aircraft_scans {
            Some(count) => self.stores.flights.replace_if_revision_and_count(flight, count).await?,
            None => self.stores.flights.replace_if_revision(flight).await?,
        };
        if !written {
            return Ok(false);
        }
        flight.revision += 1;

        if flight.status != before {
            info!(flight_id = %flight.id, from = %before, to = %flight.status, "Flight status changed");
            self.events.emit_lossy(BagEvent::FlightStatusChanged {
                flight_id: flight.id.clone(),
                old_status: before,
                new_status: flight.status,
                timestamp: flight.updated_at,
            });
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScanRecord, Zone};
    use bagtrack_common::Role;
    use chrono::NaiveDate;

    fn machine() -> (FlightStatusMachine, Stores) {
        let stores = Stores::in_memory();
        let machine = FlightStatusMachine::new(stores.clone(), EventBus::default(), &ReconciliationConfig::default());
        (machine, stores)
    }

    fn new_flight(id: &str) -> NewFlight {
        NewFlight {
            id: Some(id.to_string()),
            flight_number: "SY214".to_string(),
            flight_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            gate: None,
            aircraft_type: None,
        }
    }

    fn manager() -> Operator {
        Operator::new("m1", "ines", Role::DutyManager)
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let (machine, _) = machine();
        machine.create_flight(new_flight("F1"), &manager()).await.unwrap();
        let err = machine.create_flight(new_flight("F1"), &manager()).await.unwrap_err();
        assert!(matches!(err, ReconError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_record_scan_bumps_revision_only_on_change() {
        let (machine, _) = machine();
        machine.create_flight(new_flight("F1"), &manager()).await.unwrap();

        let first = machine.record_bagroom_scan("F1").await.unwrap();
        assert_eq!(first.status, FlightStatus::Receiving);
        assert_eq!(first.revision, 1);

        let again = machine.record_bagroom_scan("F1").await.unwrap();
        assert_eq!(again.revision, 1);
    }

    #[tokio::test]
    async fn test_reopen_requires_manager() {
        let (machine, _) = machine();
        machine.create_flight(new_flight("F1"), &manager()).await.unwrap();

        let ramp = Operator::new("r1", "sam", Role::RampAgent);
        let err = machine.reopen("F1", &ramp).await.unwrap_err();
        assert!(matches!(err, ReconError::PermissionDenied { role: Role::RampAgent, .. }));
    }

    #[tokio::test]
    async fn test_reopen_refused_unless_loaded() {
        let (machine, _) = machine();
        machine.create_flight(new_flight("F1"), &manager()).await.unwrap();

        let err = machine.reopen("F1", &manager()).await.unwrap_err();
        assert!(matches!(
            err,
            ReconError::PreconditionFailed(TransitionError::NotLoaded { status: FlightStatus::Open })
        ));
    }

    #[tokio::test]
    async fn test_complete_counts_aircraft_ledger() {
        let (machine, stores) = machine();
        machine.create_flight(new_flight("F1"), &manager()).await.unwrap();
        machine.set_checked_bags_total("F1", 1, &manager()).await.unwrap();

        let err = machine.complete_loading("F1", &manager()).await.unwrap_err();
        assert!(matches!(
            err,
            ReconError::PreconditionFailed(TransitionError::BagsMissing { missing: 1, .. })
        ));

        stores
            .scans
            .insert_new(&ScanRecord {
                flight_id: "F1".to_string(),
                checkpoint: Checkpoint::Aircraft,
                tag: "123456".to_string(),
                created_at: time::now(),
                scanned_by: manager(),
                zone: Zone::new(1),
            })
            .await
            .unwrap();

        let flight = machine.complete_loading("F1", &manager()).await.unwrap();
        assert_eq!(flight.status, FlightStatus::Loaded);
        assert_eq!(flight.aircraft_loaded_bags, Some(1));
    }

    #[tokio::test]
    async fn test_unknown_flight() {
        let (machine, _) = machine();
        assert!(matches!(
            machine.record_aircraft_scan("nope").await,
            Err(ReconError::FlightNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_gate_total_edit_requires_capability() {
        let (machine, _) = machine();
        machine.create_flight(new_flight("F1"), &manager()).await.unwrap();

        let agent = Operator::new("b1", "kim", Role::BagroomAgent);
        assert!(machine.set_checked_bags_total("F1", 3, &agent).await.is_err());

        let gate = Operator::new("g1", "ola", Role::GateController);
        let flight = machine.set_checked_bags_total("F1", 3, &gate).await.unwrap();
        assert_eq!(flight.checked_bags_total, Some(3));
        assert_eq!(flight.checked_bags_total_by, Some(gate));
    }
}
