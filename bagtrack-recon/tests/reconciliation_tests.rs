//! Integration tests for the scan reconciliation pipeline
//!
//! Run against the in-memory backend. Stale-read wrappers force the
//! optimistic checks to miss so the conditional writes have to decide.

use async_trait::async_trait;
use bagtrack_common::config::ReconciliationConfig;
use bagtrack_common::{Error, Operator, Result, Role};
use bagtrack_recon::artifacts::MemoryArtifactStore;
use bagtrack_recon::error::ReconError;
use bagtrack_recon::events::{BagEvent, EventBus};
use bagtrack_recon::models::{
    BagTagRecord, Checkpoint, ClaimOutcome, FlightState, FlightStatus, IgnoredInput, InsertOutcome,
    NewFlight, ScanRecord, ScanResult, TagClaim, TransitionError, Zone,
};
use bagtrack_recon::store::{FlightStore, ScanLedger, Stores, TagIndex};
use bagtrack_recon::AppState;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// =============================================================================
// Helpers
// =============================================================================

fn app(stores: Stores) -> AppState {
    AppState::new(stores, EventBus::default(), &ReconciliationConfig::default())
}

fn agent() -> Operator {
    Operator::new("u1", "ana", Role::BagroomAgent)
}

fn ramp() -> Operator {
    Operator::new("u2", "sam", Role::RampAgent)
}

fn gate() -> Operator {
    Operator::new("u3", "ola", Role::GateController)
}

fn manager() -> Operator {
    Operator::new("m1", "ines", Role::StationManager)
}

fn zone(n: u8) -> Option<Zone> {
    Zone::new(n)
}

async fn create_flight(state: &AppState, id: &str, number: &str, date: (i32, u32, u32)) {
    state
        .status
        .create_flight(
            NewFlight {
                id: Some(id.to_string()),
                flight_number: number.to_string(),
                flight_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
                gate: None,
                aircraft_type: None,
            },
            &manager(),
        )
        .await
        .unwrap();
}

async fn scan(state: &AppState, flight: &str, checkpoint: Checkpoint, tag: &str, zone: Option<Zone>) -> ScanResult {
    let operator = match checkpoint {
        Checkpoint::Bagroom => agent(),
        Checkpoint::Aircraft => ramp(),
    };
    state
        .engine
        .submit_scan(flight, checkpoint, tag, zone, &operator)
        .await
        .unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_scan_lifecycle_and_cross_flight_rejection() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;

    match scan(&state, "F1", Checkpoint::Bagroom, "123456", None).await {
        ScanResult::Accepted { status, .. } => assert_eq!(status, FlightStatus::Receiving),
        other => panic!("expected Accepted, got {:?}", other),
    }

    assert!(matches!(
        scan(&state, "F1", Checkpoint::Bagroom, "123456", None).await,
        ScanResult::RejectedDuplicate { .. }
    ));

    match scan(&state, "F1", Checkpoint::Aircraft, "123456", zone(2)).await {
        ScanResult::Accepted { record, status } => {
            assert_eq!(status, FlightStatus::Loading);
            assert_eq!(record.zone, zone(2));
        }
        other => panic!("expected Accepted, got {:?}", other),
    }
    let claim = state.engine.lookup_tag("123456").await.unwrap().unwrap();
    assert_eq!(claim.flight_id, "F1");
    assert_eq!(claim.last_seen_location, Checkpoint::Aircraft);

    create_flight(&state, "F2", "SY300", (2025, 1, 16)).await;
    match scan(&state, "F2", Checkpoint::Bagroom, "123456", None).await {
        ScanResult::RejectedCrossFlight { registered, message, .. } => {
            assert_eq!(registered.flight_id, "F1");
            assert!(message.contains("Registered flight: SY214 (2025-01-15)"));
            assert!(message.contains("Scanned flight: SY300 (2025-01-16)"));
        }
        other => panic!("expected RejectedCrossFlight, got {:?}", other),
    }
}

#[tokio::test]
async fn test_completion_gate_reports_missing_then_succeeds() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    state.status.set_checked_bags_total("F1", 3, &gate()).await.unwrap();

    scan(&state, "F1", Checkpoint::Aircraft, "100001", zone(1)).await;
    scan(&state, "F1", Checkpoint::Aircraft, "100002", zone(3)).await;

    let err = state.status.complete_loading("F1", &ramp()).await.unwrap_err();
    assert!(matches!(
        err,
        ReconError::PreconditionFailed(TransitionError::BagsMissing { missing: 1, expected: 3, scanned: 2 })
    ));

    scan(&state, "F1", Checkpoint::Aircraft, "100003", zone(4)).await;
    let flight = state.status.complete_loading("F1", &ramp()).await.unwrap();
    assert_eq!(flight.status, FlightStatus::Loaded);
    assert!(flight.aircraft_loading_completed);
    assert_eq!(flight.loading_completed_by, Some(ramp()));
    assert_eq!(flight.aircraft_loaded_bags, Some(3));
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn test_cross_flight_leaves_ledger_and_claim_untouched() {
    let stores = Stores::in_memory();
    let state = app(stores.clone());
    create_flight(&state, "A", "SY100", (2025, 2, 1)).await;
    create_flight(&state, "B", "SY200", (2025, 2, 1)).await;

    scan(&state, "A", Checkpoint::Bagroom, "555555", None).await;
    let before = stores.tags.lookup("555555").await.unwrap();

    for checkpoint in [Checkpoint::Bagroom, Checkpoint::Aircraft] {
        let result = scan(&state, "B", checkpoint, "555555", zone(1)).await;
        assert!(matches!(result, ScanResult::RejectedCrossFlight { .. }));
        assert_eq!(stores.scans.count("B", checkpoint).await.unwrap(), 0);
    }

    assert_eq!(stores.tags.lookup("555555").await.unwrap(), before);
    let flight_b = state.status.get_flight("B").await.unwrap();
    assert_eq!(flight_b.status, FlightStatus::Open);
}

#[tokio::test]
async fn test_strict_manifest_gates_scans() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    state
        .manifest
        .import_batch("F1", &["200001".to_string()], None, &manager())
        .await
        .unwrap();

    state.status.set_strict_manifest("F1", true, &manager()).await.unwrap();
    match scan(&state, "F1", Checkpoint::Bagroom, "200002", None).await {
        ScanResult::RejectedManifestViolation { tag, message, .. } => {
            assert_eq!(tag, "200002");
            assert!(message.contains("SY214 (2025-01-15)"));
        }
        other => panic!("expected RejectedManifestViolation, got {:?}", other),
    }
    assert!(scan(&state, "F1", Checkpoint::Bagroom, "200001", None).await.is_accepted());

    state.status.set_strict_manifest("F1", false, &manager()).await.unwrap();
    assert!(scan(&state, "F1", Checkpoint::Bagroom, "200002", None).await.is_accepted());
}

#[tokio::test]
async fn test_manifest_check_runs_before_duplicate_check() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    assert!(scan(&state, "F1", Checkpoint::Bagroom, "300001", None).await.is_accepted());

    state.status.set_strict_manifest("F1", true, &manager()).await.unwrap();
    assert!(matches!(
        scan(&state, "F1", Checkpoint::Bagroom, "300001", None).await,
        ScanResult::RejectedManifestViolation { .. }
    ));
}

#[tokio::test]
async fn test_bagroom_scan_after_loading_keeps_status() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;

    scan(&state, "F1", Checkpoint::Aircraft, "400001", zone(1)).await;
    match scan(&state, "F1", Checkpoint::Bagroom, "400002", None).await {
        ScanResult::Accepted { status, .. } => assert_eq!(status, FlightStatus::Loading),
        other => panic!("expected Accepted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_completion_requires_gate_total() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    scan(&state, "F1", Checkpoint::Aircraft, "500001", zone(1)).await;

    assert!(matches!(
        state.status.complete_loading("F1", &ramp()).await,
        Err(ReconError::PreconditionFailed(TransitionError::MissingGateTotal))
    ));

    state.status.set_checked_bags_total("F1", 0, &gate()).await.unwrap();
    assert!(matches!(
        state.status.complete_loading("F1", &ramp()).await,
        Err(ReconError::PreconditionFailed(TransitionError::ExcessBags { excess: 1, .. }))
    ));
}

#[tokio::test]
async fn test_locked_flight_rejects_until_reopened() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    state.status.set_checked_bags_total("F1", 1, &gate()).await.unwrap();
    scan(&state, "F1", Checkpoint::Aircraft, "600001", zone(1)).await;
    state.status.complete_loading("F1", &ramp()).await.unwrap();

    for checkpoint in [Checkpoint::Bagroom, Checkpoint::Aircraft] {
        assert!(matches!(
            scan(&state, "F1", checkpoint, "600002", zone(2)).await,
            ScanResult::RejectedFlightLocked { .. }
        ));
    }
    // Gate input is never locked
    state.status.set_checked_bags_total("F1", 2, &gate()).await.unwrap();

    let flight = state.status.reopen("F1", &manager()).await.unwrap();
    assert_eq!(flight.status, FlightStatus::Loading);
    assert!(flight.reopened_at.is_some());
    assert!(scan(&state, "F1", Checkpoint::Aircraft, "600002", zone(2)).await.is_accepted());
}

#[tokio::test]
async fn test_partial_and_empty_reads_are_ignored() {
    let stores = Stores::in_memory();
    let state = app(stores.clone());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;

    assert_eq!(
        scan(&state, "F1", Checkpoint::Bagroom, "\r\n", None).await,
        ScanResult::Ignored { reason: IgnoredInput::Empty }
    );
    assert_eq!(
        scan(&state, "F1", Checkpoint::Bagroom, "0123", None).await,
        ScanResult::Ignored {
            reason: IgnoredInput::TooShort { length: 4, min_length: 6 }
        }
    );
    assert_eq!(stores.scans.count("F1", Checkpoint::Bagroom).await.unwrap(), 0);
    assert_eq!(state.status.get_flight("F1").await.unwrap().status, FlightStatus::Open);
}

#[tokio::test]
async fn test_scanner_terminators_are_stripped() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;

    match scan(&state, "F1", Checkpoint::Bagroom, " 0220\r123456\n", None).await {
        ScanResult::Accepted { record, .. } => assert_eq!(record.tag, "0220123456"),
        other => panic!("expected Accepted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_zone_rules() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;

    let err = state
        .engine
        .submit_scan("F1", Checkpoint::Aircraft, "700001", None, &ramp())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconError::InvalidInput(_)));

    match scan(&state, "F1", Checkpoint::Bagroom, "700001", zone(3)).await {
        ScanResult::Accepted { record, .. } => assert_eq!(record.zone, None),
        other => panic!("expected Accepted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_flight_is_an_error() {
    let state = app(Stores::in_memory());
    let err = state
        .engine
        .submit_scan("nope", Checkpoint::Bagroom, "123456", None, &agent())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconError::FlightNotFound(_)));
}

#[tokio::test]
async fn test_scans_listed_newest_first_and_counted_by_zone() {
    let stores = Stores::in_memory();
    let state = app(stores.clone());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;

    scan(&state, "F1", Checkpoint::Aircraft, "800001", zone(1)).await;
    scan(&state, "F1", Checkpoint::Aircraft, "800002", zone(1)).await;
    scan(&state, "F1", Checkpoint::Aircraft, "800003", zone(4)).await;

    let listed: Vec<String> = state
        .engine
        .list_scans("F1", Checkpoint::Aircraft)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.tag)
        .collect();
    assert_eq!(listed, vec!["800003", "800002", "800001"]);

    let report = state.status.flight_report("F1").await.unwrap();
    let expected: BTreeMap<Zone, u64> = [(1, 2), (2, 0), (3, 0), (4, 1)]
        .into_iter()
        .map(|(z, n)| (Zone::new(z).unwrap(), n))
        .collect();
    assert_eq!(report.aircraft_by_zone, expected);
    assert_eq!(report.aircraft_scans, 3);
    assert_eq!(report.missing, None);
}

// =============================================================================
// Cascade delete
// =============================================================================

#[tokio::test]
async fn test_cascade_delete_is_idempotent() {
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let stores = Stores {
        artifacts: artifacts.clone(),
        ..Stores::in_memory()
    };
    let state = app(stores.clone());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    create_flight(&state, "F2", "SY300", (2025, 1, 15)).await;

    for i in 0..5 {
        let tag = format!("90000{}", i);
        scan(&state, "F1", Checkpoint::Bagroom, &tag, None).await;
        scan(&state, "F1", Checkpoint::Aircraft, &tag, zone(1)).await;
    }
    scan(&state, "F2", Checkpoint::Bagroom, "999999", None).await;
    state
        .manifest
        .import_free_text("F1", "900000 900001 900002", None, &manager())
        .await
        .unwrap();
    artifacts.put("flights/F1/reports/summary.pdf", vec![1]).await;
    artifacts.put("flights/F1/manifests/page1.jpg", vec![2]).await;
    artifacts.put("flights/F2/reports/summary.pdf", vec![3]).await;

    let first = state.cascade.delete_flight_cascade("F1", &manager()).await.unwrap();
    assert_eq!(first.scans_deleted, 10);
    assert_eq!(first.manifest_entries_deleted, 3);
    assert_eq!(first.tags_released, 5);
    assert_eq!(first.artifacts_deleted, 2);
    assert!(first.flight_deleted);

    let second = state.cascade.delete_flight_cascade("F1", &manager()).await.unwrap();
    assert_eq!(second.scans_deleted, 0);
    assert!(!second.flight_deleted);

    for checkpoint in [Checkpoint::Bagroom, Checkpoint::Aircraft] {
        assert_eq!(stores.scans.count("F1", checkpoint).await.unwrap(), 0);
    }
    assert_eq!(stores.manifests.count("F1").await.unwrap(), 0);
    assert_eq!(stores.tags.count_for_flight("F1").await.unwrap(), 0);
    assert_eq!(stores.tags.count_for_flight("F2").await.unwrap(), 1);
    assert_eq!(artifacts.keys().await, vec!["flights/F2/reports/summary.pdf".to_string()]);
    assert!(matches!(
        state.status.get_flight("F1").await,
        Err(ReconError::FlightNotFound(_))
    ));
}

#[tokio::test]
async fn test_cascade_frees_tags_for_other_flights() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    create_flight(&state, "F2", "SY300", (2025, 1, 16)).await;

    scan(&state, "F1", Checkpoint::Bagroom, "123456", None).await;
    state.cascade.delete_flight_cascade("F1", &manager()).await.unwrap();

    assert!(scan(&state, "F2", Checkpoint::Bagroom, "123456", None).await.is_accepted());
}

#[tokio::test]
async fn test_cascade_requires_manager() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;

    let err = state.cascade.delete_flight_cascade("F1", &agent()).await.unwrap_err();
    assert!(matches!(err, ReconError::PermissionDenied { .. }));
    assert!(state.status.get_flight("F1").await.is_ok());
}

// =============================================================================
// Reassignment
// =============================================================================

#[tokio::test]
async fn test_reassign_moves_claim_and_keeps_first_seen() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    create_flight(&state, "F2", "SY300", (2025, 1, 16)).await;
    scan(&state, "F1", Checkpoint::Bagroom, "123456", None).await;
    let original = state.engine.lookup_tag("123456").await.unwrap().unwrap();

    let err = state.engine.reassign_tag("123456", "F2", &agent()).await.unwrap_err();
    assert!(matches!(err, ReconError::PermissionDenied { .. }));

    let moved = state.engine.reassign_tag("123456", "F2", &manager()).await.unwrap();
    assert_eq!(moved.flight_id, "F2");
    assert_eq!(moved.flight_number.as_deref(), Some("SY300"));
    assert_eq!(moved.first_seen_at, original.first_seen_at);

    assert!(scan(&state, "F2", Checkpoint::Bagroom, "123456", None).await.is_accepted());
    assert!(matches!(
        scan(&state, "F1", Checkpoint::Aircraft, "123456", zone(1)).await,
        ScanResult::RejectedCrossFlight { .. }
    ));
}

#[tokio::test]
async fn test_reassign_unknown_tag() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F2", "SY300", (2025, 1, 16)).await;

    let err = state.engine.reassign_tag("000000", "F2", &manager()).await.unwrap_err();
    assert!(matches!(err, ReconError::Storage(bagtrack_common::Error::NotFound(_))));
}

// =============================================================================
// Races
// =============================================================================

/// Ledger whose reads always miss, as if a concurrent insert had not landed yet
struct StaleLedger(Arc<dyn ScanLedger>);

#[async_trait]
impl ScanLedger for StaleLedger {
    async fn find(&self, _: &str, _: Checkpoint, _: &str) -> Result<Option<ScanRecord>> {
        Ok(None)
    }
    async fn insert_new(&self, record: &ScanRecord) -> Result<InsertOutcome> {
        self.0.insert_new(record).await
    }
    async fn list(&self, flight_id: &str, checkpoint: Checkpoint) -> Result<Vec<ScanRecord>> {
        self.0.list(flight_id, checkpoint).await
    }
    async fn count(&self, flight_id: &str, checkpoint: Checkpoint) -> Result<u64> {
        self.0.count(flight_id, checkpoint).await
    }
    async fn count_by_zone(&self, flight_id: &str) -> Result<BTreeMap<Zone, u64>> {
        self.0.count_by_zone(flight_id).await
    }
    async fn delete_page(&self, flight_id: &str, limit: usize) -> Result<usize> {
        self.0.delete_page(flight_id, limit).await
    }
}

/// Tag index whose lookups always miss
struct StaleIndex(Arc<dyn TagIndex>);

#[async_trait]
impl TagIndex for StaleIndex {
    async fn lookup(&self, _: &str) -> Result<Option<BagTagRecord>> {
        Ok(None)
    }
    async fn claim(&self, claim: &TagClaim) -> Result<ClaimOutcome> {
        self.0.claim(claim).await
    }
    async fn reassign(&self, claim: &TagClaim) -> Result<Option<BagTagRecord>> {
        self.0.reassign(claim).await
    }
    async fn release_unbacked(&self, claim: &TagClaim) -> Result<bool> {
        self.0.release_unbacked(claim).await
    }
    async fn release_page(&self, flight_id: &str, limit: usize) -> Result<usize> {
        self.0.release_page(flight_id, limit).await
    }
    async fn count_for_flight(&self, flight_id: &str) -> Result<u64> {
        self.0.count_for_flight(flight_id).await
    }
}

#[tokio::test]
async fn test_lost_insert_race_reports_duplicate() {
    let fresh = Stores::in_memory();
    let stale = Stores {
        scans: Arc::new(StaleLedger(fresh.scans.clone())),
        ..fresh.clone()
    };
    let state = app(fresh);
    let racer = app(stale);
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;

    assert!(scan(&state, "F1", Checkpoint::Bagroom, "123456", None).await.is_accepted());
    match scan(&racer, "F1", Checkpoint::Bagroom, "123456", None).await {
        ScanResult::RejectedDuplicate { previous, .. } => assert_eq!(previous.scanned_by, agent()),
        other => panic!("expected RejectedDuplicate, got {:?}", other),
    }
}

#[tokio::test]
async fn test_lost_claim_race_reports_cross_flight() {
    let fresh = Stores::in_memory();
    let stale = Stores {
        tags: Arc::new(StaleIndex(fresh.tags.clone())),
        ..fresh.clone()
    };
    let state = app(fresh.clone());
    let racer = app(stale);
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    create_flight(&state, "F2", "SY300", (2025, 1, 16)).await;

    assert!(scan(&state, "F1", Checkpoint::Bagroom, "123456", None).await.is_accepted());
    assert!(matches!(
        scan(&racer, "F2", Checkpoint::Bagroom, "123456", None).await,
        ScanResult::RejectedCrossFlight { .. }
    ));
    assert_eq!(fresh.scans.count("F2", Checkpoint::Bagroom).await.unwrap(), 0);
}

/// Flight store that serves one outdated snapshot before reading through
struct StaleFlight {
    inner: Arc<dyn FlightStore>,
    snapshot: Mutex<Option<FlightState>>,
}

#[async_trait]
impl FlightStore for StaleFlight {
    async fn get(&self, flight_id: &str) -> Result<Option<FlightState>> {
        let snapshot = self.snapshot.lock().unwrap().take();
        match snapshot {
            Some(flight) if flight.id == flight_id => Ok(Some(flight)),
            _ => self.inner.get(flight_id).await,
        }
    }
    async fn insert(&self, flight: &FlightState) -> Result<bool> {
        self.inner.insert(flight).await
    }
    async fn replace_if_revision(&self, flight: &FlightState) -> Result<bool> {
        self.inner.replace_if_revision(flight).await
    }
    async fn replace_if_revision_and_count(&self, flight: &FlightState, aircraft_scans: u64) -> Result<bool> {
        self.inner.replace_if_revision_and_count(flight, aircraft_scans).await
    }
    async fn delete(&self, flight_id: &str) -> Result<()> {
        self.inner.delete(flight_id).await
    }
}

/// Ledger whose first count lags one record behind
struct LaggingCount {
    inner: Arc<dyn ScanLedger>,
    lagged: AtomicBool,
}

#[async_trait]
impl ScanLedger for LaggingCount {
    async fn find(&self, flight_id: &str, checkpoint: Checkpoint, tag: &str) -> Result<Option<ScanRecord>> {
        self.inner.find(flight_id, checkpoint, tag).await
    }
    async fn insert_new(&self, record: &ScanRecord) -> Result<InsertOutcome> {
        self.inner.insert_new(record).await
    }
    async fn list(&self, flight_id: &str, checkpoint: Checkpoint) -> Result<Vec<ScanRecord>> {
        self.inner.list(flight_id, checkpoint).await
    }
    async fn count(&self, flight_id: &str, checkpoint: Checkpoint) -> Result<u64> {
        let count = self.inner.count(flight_id, checkpoint).await?;
        if self.lagged.swap(true, Ordering::SeqCst) {
            Ok(count)
        } else {
            Ok(count.saturating_sub(1))
        }
    }
    async fn count_by_zone(&self, flight_id: &str) -> Result<BTreeMap<Zone, u64>> {
        self.inner.count_by_zone(flight_id).await
    }
    async fn delete_page(&self, flight_id: &str, limit: usize) -> Result<usize> {
        self.inner.delete_page(flight_id, limit).await
    }
}

/// Ledger whose inserts fail as if the backend went away
struct FailingLedger(Arc<dyn ScanLedger>);

#[async_trait]
impl ScanLedger for FailingLedger {
    async fn find(&self, flight_id: &str, checkpoint: Checkpoint, tag: &str) -> Result<Option<ScanRecord>> {
        self.0.find(flight_id, checkpoint, tag).await
    }
    async fn insert_new(&self, _: &ScanRecord) -> Result<InsertOutcome> {
        Err(Error::StorageUnavailable("ledger offline".to_string()))
    }
    async fn list(&self, flight_id: &str, checkpoint: Checkpoint) -> Result<Vec<ScanRecord>> {
        self.0.list(flight_id, checkpoint).await
    }
    async fn count(&self, flight_id: &str, checkpoint: Checkpoint) -> Result<u64> {
        self.0.count(flight_id, checkpoint).await
    }
    async fn count_by_zone(&self, flight_id: &str) -> Result<BTreeMap<Zone, u64>> {
        self.0.count_by_zone(flight_id).await
    }
    async fn delete_page(&self, flight_id: &str, limit: usize) -> Result<usize> {
        self.0.delete_page(flight_id, limit).await
    }
}

#[tokio::test]
async fn test_scan_racing_completion_is_rejected_as_locked() {
    let fresh = Stores::in_memory();
    let state = app(fresh.clone());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    state.status.set_checked_bags_total("F1", 1, &gate()).await.unwrap();
    assert!(scan(&state, "F1", Checkpoint::Aircraft, "100001", zone(1)).await.is_accepted());

    // Racer passed its lock check before completion landed
    let before_completion = state.status.get_flight("F1").await.unwrap();
    state.status.complete_loading("F1", &ramp()).await.unwrap();
    let racer = app(Stores {
        flights: Arc::new(StaleFlight {
            inner: fresh.flights.clone(),
            snapshot: Mutex::new(Some(before_completion)),
        }),
        ..fresh.clone()
    });

    match scan(&racer, "F1", Checkpoint::Aircraft, "100002", zone(2)).await {
        ScanResult::RejectedFlightLocked { message, .. } => assert!(message.contains("LOADED")),
        other => panic!("expected RejectedFlightLocked, got {:?}", other),
    }

    let report = state.status.flight_report("F1").await.unwrap();
    assert_eq!(report.aircraft_scans, 1);
    assert_eq!(report.flight.aircraft_loaded_bags, Some(1));
    assert_eq!(report.missing, Some(0));
    assert!(state.engine.lookup_tag("100002").await.unwrap().is_none());
}

#[tokio::test]
async fn test_completion_recounts_when_scan_lands_after_count() {
    let fresh = Stores::in_memory();
    let state = app(fresh.clone());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    state.status.set_checked_bags_total("F1", 1, &gate()).await.unwrap();
    scan(&state, "F1", Checkpoint::Aircraft, "100001", zone(1)).await;
    scan(&state, "F1", Checkpoint::Aircraft, "100002", zone(2)).await;

    let racer = app(Stores {
        scans: Arc::new(LaggingCount {
            inner: fresh.scans.clone(),
            lagged: AtomicBool::new(false),
        }),
        ..fresh.clone()
    });

    let err = racer.status.complete_loading("F1", &ramp()).await.unwrap_err();
    assert!(matches!(
        err,
        ReconError::PreconditionFailed(TransitionError::ExcessBags { excess: 1, expected: 1, scanned: 2 })
    ));
    let flight = state.status.get_flight("F1").await.unwrap();
    assert_eq!(flight.status, FlightStatus::Loading);
    assert!(!flight.aircraft_loading_completed);
}

#[tokio::test]
async fn test_failed_insert_releases_fresh_claim() {
    let fresh = Stores::in_memory();
    let state = app(fresh.clone());
    let broken = app(Stores {
        scans: Arc::new(FailingLedger(fresh.scans.clone())),
        ..fresh.clone()
    });
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    create_flight(&state, "F2", "SY300", (2025, 1, 16)).await;

    let err = broken
        .engine
        .submit_scan("F1", Checkpoint::Bagroom, "123456", None, &agent())
        .await
        .unwrap_err();
    assert!(err.is_retriable());
    assert!(state.engine.lookup_tag("123456").await.unwrap().is_none());

    // Tag is free for the flight that really has the bag
    assert!(scan(&state, "F2", Checkpoint::Bagroom, "123456", None).await.is_accepted());
}

#[tokio::test]
async fn test_failed_insert_keeps_existing_claim() {
    let fresh = Stores::in_memory();
    let state = app(fresh.clone());
    let broken = app(Stores {
        scans: Arc::new(FailingLedger(fresh.scans.clone())),
        ..fresh.clone()
    });
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    assert!(scan(&state, "F1", Checkpoint::Bagroom, "123456", None).await.is_accepted());

    broken
        .engine
        .submit_scan("F1", Checkpoint::Aircraft, "123456", zone(1), &ramp())
        .await
        .unwrap_err();
    let claim = state.engine.lookup_tag("123456").await.unwrap().unwrap();
    assert_eq!(claim.flight_id, "F1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_tag_accepts_exactly_once() {
    let stores = Stores::in_memory();
    let state = app(stores.clone());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let state = state.clone();
            tokio::spawn(async move { scan(&state, "F1", Checkpoint::Bagroom, "123456", None).await })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            ScanResult::Accepted { .. } => accepted += 1,
            ScanResult::RejectedDuplicate { .. } => {}
            other => panic!("unexpected result {:?}", other),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(stores.scans.count("F1", Checkpoint::Bagroom).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_flights_claim_tag_once() {
    let stores = Stores::in_memory();
    let state = app(stores.clone());
    let flights = ["F1", "F2", "F3", "F4"];
    for (i, id) in flights.iter().enumerate() {
        create_flight(&state, id, &format!("SY{}", 100 + i), (2025, 1, 15)).await;
    }

    let handles: Vec<_> = flights
        .iter()
        .map(|id| {
            let state = state.clone();
            let id = id.to_string();
            tokio::spawn(async move {
                let result = scan(&state, &id, Checkpoint::Bagroom, "654321", None).await;
                (id, result)
            })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        let (id, result) = handle.await.unwrap();
        match result {
            ScanResult::Accepted { .. } => winners.push(id),
            ScanResult::RejectedCrossFlight { .. } => {}
            other => panic!("unexpected result {:?}", other),
        }
    }
    assert_eq!(winners.len(), 1);

    let claim = stores.tags.lookup("654321").await.unwrap().unwrap();
    assert_eq!(claim.flight_id, winners[0]);
    for id in flights {
        let expected = u64::from(id == winners[0]);
        assert_eq!(stores.scans.count(id, Checkpoint::Bagroom).await.unwrap(), expected);
    }
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_accepted_scan_emits_events() {
    let state = app(Stores::in_memory());
    create_flight(&state, "F1", "SY214", (2025, 1, 15)).await;
    let mut rx = state.events.subscribe();

    scan(&state, "F1", Checkpoint::Bagroom, "123456", None).await;
    scan(&state, "F1", Checkpoint::Bagroom, "123456", None).await;

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let BagEvent::ScanRejected { reason, .. } = &event {
            assert_eq!(reason, "duplicate");
        }
        kinds.push(event.event_type());
    }
    assert_eq!(kinds, vec!["FlightStatusChanged", "ScanAccepted", "ScanRejected"]);
}
