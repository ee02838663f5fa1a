//! Storage traits for flights, the tag index, manifests and the scan ledger
//!
//! Every write that decides an outcome is a single conditional operation in
//! the backend: create-only scan insert refused on locked flights, tag claim
//! guarded by owning flight, flight update guarded by revision, completion
//! guarded by revision and aircraft ledger size. Services never
//! read-then-write to make a decision that must be atomic.
//!
//! All four stores of one [`Stores`] share a backend, so a conditional write
//! in one may test rows owned by another.

use async_trait::async_trait;
use bagtrack_common::Result;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::artifacts::{ArtifactStore, MemoryArtifactStore};
use crate::db::SqliteStore;
use crate::models::{
    BagTagRecord, Checkpoint, ClaimOutcome, FlightState, InsertOutcome, ManifestEntry, ScanRecord,
    TagClaim, Zone,
};

pub mod memory;

pub use memory::MemoryStore;

/// Flight documents
#[async_trait]
pub trait FlightStore: Send + Sync {
    async fn get(&self, flight_id: &str) -> Result<Option<FlightState>>;

    /// Create-only; returns false if the id is taken
    async fn insert(&self, flight: &FlightState) -> Result<bool>;

    /// Write `flight` if the stored revision still equals `flight.revision`
    ///
    /// On success the stored revision is incremented and true is returned.
    async fn replace_if_revision(&self, flight: &FlightState) -> Result<bool>;

    /// Like [`FlightStore::replace_if_revision`], and additionally only if
    /// the aircraft ledger still holds exactly `aircraft_scans` records
    ///
    /// Serializes against [`ScanLedger::insert_new`]: a scan either lands
    /// before the write and fails the count, or after it and sees the lock.
    async fn replace_if_revision_and_count(&self, flight: &FlightState, aircraft_scans: u64) -> Result<bool>;

    /// Fails with `NotFound` if the flight does not exist
    async fn delete(&self, flight_id: &str) -> Result<()>;
}

/// Global index mapping each bag tag to the single flight that owns it
#[async_trait]
pub trait TagIndex: Send + Sync {
    async fn lookup(&self, tag: &str) -> Result<Option<BagTagRecord>>;

    /// Create or refresh the record if absent or owned by `claim.flight_id`
    ///
    /// If another flight owns the tag nothing is written and the holder's
    /// record is returned as [`ClaimOutcome::HeldBy`].
    async fn claim(&self, claim: &TagClaim) -> Result<ClaimOutcome>;

    /// Unconditionally move an existing tag to another flight
    async fn reassign(&self, claim: &TagClaim) -> Result<Option<BagTagRecord>>;

    /// Remove a claim this flight made that no scan record backs
    ///
    /// Deletes only if the tag is held by `claim.flight_id` with
    /// `first_seen_at == claim.seen_at` and the flight has no scan record
    /// for it. Returns true if a record was removed.
    async fn release_unbacked(&self, claim: &TagClaim) -> Result<bool>;

    /// Delete up to `limit` records owned by `flight_id`; returns the number deleted
    async fn release_page(&self, flight_id: &str, limit: usize) -> Result<usize>;

    async fn count_for_flight(&self, flight_id: &str) -> Result<u64>;

    /// Release every record owned by `flight_id`, one page at a time
    async fn release_all_for_flight(&self, flight_id: &str, page_size: usize) -> Result<usize> {
        let page_size = page_size.max(1);
        let mut total = 0;
        loop {
            let deleted = self.release_page(flight_id, page_size).await?;
            total += deleted;
            if deleted < page_size {
                return Ok(total);
            }
        }
    }
}

/// Per-flight manifest allow-lists
#[async_trait]
pub trait ManifestStore: Send + Sync {
    async fn contains(&self, flight_id: &str, tag: &str) -> Result<bool>;

    /// Write one page of entries atomically; existing entries are overwritten
    async fn upsert_page(&self, entries: &[ManifestEntry]) -> Result<()>;

    /// Entries for a flight ordered by tag
    async fn list(&self, flight_id: &str) -> Result<Vec<ManifestEntry>>;

    async fn count(&self, flight_id: &str) -> Result<u64>;

    /// Delete up to `limit` entries; returns the number deleted
    async fn delete_page(&self, flight_id: &str, limit: usize) -> Result<usize>;
}

/// Per-flight, per-checkpoint scan records keyed by tag
#[async_trait]
pub trait ScanLedger: Send + Sync {
    async fn find(&self, flight_id: &str, checkpoint: Checkpoint, tag: &str) -> Result<Option<ScanRecord>>;

    /// Create-only insert keyed by (flight, checkpoint, tag)
    ///
    /// Exactly one of any set of concurrent inserts for the same key returns
    /// [`InsertOutcome::Inserted`]; the rest see the winner's record. Nothing
    /// is written while the flight is locked ([`InsertOutcome::FlightLocked`]).
    async fn insert_new(&self, record: &ScanRecord) -> Result<InsertOutcome>;

    /// Records for a checkpoint, newest first
    async fn list(&self, flight_id: &str, checkpoint: Checkpoint) -> Result<Vec<ScanRecord>>;

    async fn count(&self, flight_id: &str, checkpoint: Checkpoint) -> Result<u64>;

    /// Aircraft scans per zone; every zone is present, zero if unused
    async fn count_by_zone(&self, flight_id: &str) -> Result<BTreeMap<Zone, u64>>;

    /// Delete up to `limit` records across both checkpoints; returns the number deleted
    async fn delete_page(&self, flight_id: &str, limit: usize) -> Result<usize>;
}

/// Handles to every backend a service may need
#[derive(Clone)]
pub struct Stores {
    pub flights: Arc<dyn FlightStore>,
    pub tags: Arc<dyn TagIndex>,
    pub manifests: Arc<dyn ManifestStore>,
    pub scans: Arc<dyn ScanLedger>,
    pub artifacts: Arc<dyn ArtifactStore>,
}

impl Stores {
    /// SQLite-backed stores sharing one pool
    pub fn sqlite(pool: SqlitePool, artifacts: Arc<dyn ArtifactStore>) -> Self {
        let store = Arc::new(SqliteStore::new(pool));
        Self {
            flights: store.clone(),
            tags: store.clone(),
            manifests: store.clone(),
            scans: store,
            artifacts,
        }
    }

    /// Process-local stores, used by tests and demos
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            flights: store.clone(),
            tags: store.clone(),
            manifests: store.clone(),
            scans: store,
            artifacts: Arc::new(MemoryArtifactStore::new()),
        }
    }
}

/// Zone map with every zone present
pub(crate) fn empty_zone_counts() -> BTreeMap<Zone, u64> {
    Zone::all().map(|zone| (zone, 0)).collect()
}
