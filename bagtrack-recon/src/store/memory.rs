//! In-process backend
//!
//! One mutex guards all collections, so every trait method is atomic with
//! respect to every other. Used for tests and for running without a database.

use async_trait::async_trait;
use bagtrack_common::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{empty_zone_counts, FlightStore, ManifestStore, ScanLedger, TagIndex};
use crate::models::{
    BagTagRecord, Checkpoint, ClaimOutcome, FlightState, InsertOutcome, ManifestEntry, ScanRecord,
    TagClaim, Zone,
};

type ScanKey = (String, Checkpoint, String);

#[derive(Default)]
struct Inner {
    flights: HashMap<String, FlightState>,
    tags: HashMap<String, BagTagRecord>,
    manifests: BTreeMap<(String, String), ManifestEntry>,
    /// Value carries an insertion sequence for stable newest-first ordering
    scans: HashMap<ScanKey, (u64, ScanRecord)>,
    next_seq: u64,
}

impl Inner {
    fn flight_is_locked(&self, flight_id: &str) -> bool {
        self.flights.get(flight_id).is_some_and(FlightState::is_locked)
    }

    fn aircraft_count(&self, flight_id: &str) -> u64 {
        self.scans
            .keys()
            .filter(|(f, c, _)| f == flight_id && *c == Checkpoint::Aircraft)
            .count() as u64
    }

    fn replace_if_revision(&mut self, flight: &FlightState) -> bool {
        match self.flights.get_mut(&flight.id) {
            Some(stored) if stored.revision == flight.revision => {
                *stored = flight.clone();
                stored.revision += 1;
                true
            }
            _ => false,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlightStore for MemoryStore {
    async fn get(&self, flight_id: &str) -> Result<Option<FlightState>> {
        Ok(self.inner.lock().await.flights.get(flight_id).cloned())
    }

    async fn insert(&self, flight: &FlightState) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.flights.contains_key(&flight.id) {
            return Ok(false);
        }
        inner.flights.insert(flight.id.clone(), flight.clone());
        Ok(true)
    }

    async fn replace_if_revision(&self, flight: &FlightState) -> Result<bool> {
        Ok(self.inner.lock().await.replace_if_revision(flight))
    }

    async fn replace_if_revision_and_count(&self, flight: &FlightState, aircraft_scans: u64) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.aircraft_count(&flight.id) != aircraft_scans {
            return Ok(false);
        }
        Ok(inner.replace_if_revision(flight))
    }

    async fn delete(&self, flight_id: &str) -> Result<()> {
        match self.inner.lock().await.flights.remove(flight_id) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("Flight {}", flight_id))),
        }
    }
}

#[async_trait]
impl TagIndex for MemoryStore {
    async fn lookup(&self, tag: &str) -> Result<Option<BagTagRecord>> {
        Ok(self.inner.lock().await.tags.get(tag).cloned())
    }

    async fn claim(&self, claim: &TagClaim) -> Result<ClaimOutcome> {
        let mut inner = self.inner.lock().await;
        match inner.tags.get_mut(&claim.tag) {
            Some(record) if record.flight_id != claim.flight_id => Ok(ClaimOutcome::HeldBy(record.clone())),
            Some(record) => {
                claim.merge_into(record);
                Ok(ClaimOutcome::Claimed(record.clone()))
            }
            None => {
                let record = claim.to_new_record();
                inner.tags.insert(claim.tag.clone(), record.clone());
                Ok(ClaimOutcome::Claimed(record))
            }
        }
    }

    async fn reassign(&self, claim: &TagClaim) -> Result<Option<BagTagRecord>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.tags.get_mut(&claim.tag).map(|record| {
            claim.merge_into(record);
            record.clone()
        }))
    }

    async fn release_unbacked(&self, claim: &TagClaim) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let backed = inner
            .scans
            .keys()
            .any(|(f, _, t)| *f == claim.flight_id && *t == claim.tag);
        let ours = inner
            .tags
            .get(&claim.tag)
            .is_some_and(|r| r.flight_id == claim.flight_id && r.first_seen_at == claim.seen_at);
        if backed || !ours {
            return Ok(false);
        }
        inner.tags.remove(&claim.tag);
        Ok(true)
    }

    async fn release_page(&self, flight_id: &str, limit: usize) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let victims: Vec<String> = inner
            .tags
            .values()
            .filter(|r| r.flight_id == flight_id)
            .take(limit)
            .map(|r| r.tag.clone())
            .collect();
        for tag in &victims {
            inner.tags.remove(tag);
        }
        Ok(victims.len())
    }

    async fn count_for_flight(&self, flight_id: &str) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.tags.values().filter(|r| r.flight_id == flight_id).count() as u64)
    }
}

#[async_trait]
impl ManifestStore for MemoryStore {
    async fn contains(&self, flight_id: &str, tag: &str) -> Result<bool> {
        let key = (flight_id.to_string(), tag.to_string());
        Ok(self.inner.lock().await.manifests.contains_key(&key))
    }

    async fn upsert_page(&self, entries: &[ManifestEntry]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        for entry in entries {
            inner
                .manifests
                .insert((entry.flight_id.clone(), entry.tag.clone()), entry.clone());
        }
        Ok(())
    }

    async fn list(&self, flight_id: &str) -> Result<Vec<ManifestEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .manifests
            .values()
            .filter(|e| e.flight_id == flight_id)
            .cloned()
            .collect())
    }

    async fn count(&self, flight_id: &str) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.manifests.keys().filter(|(f, _)| f == flight_id).count() as u64)
    }

    async fn delete_page(&self, flight_id: &str, limit: usize) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let victims: Vec<(String, String)> = inner
            .manifests
            .keys()
            .filter(|(f, _)| f == flight_id)
            .take(limit)
            .cloned()
            .collect();
        for key in &victims {
            inner.manifests.remove(key);
        }
        Ok(victims.len())
    }
}

#[async_trait]
impl ScanLedger for MemoryStore {
    async fn find(&self, flight_id: &str, checkpoint: Checkpoint, tag: &str) -> Result<Option<ScanRecord>> {
        let key = (flight_id.to_string(), checkpoint, tag.to_string());
        Ok(self.inner.lock().await.scans.get(&key).map(|(_, r)| r.clone()))
    }

    async fn insert_new(&self, record: &ScanRecord) -> Result<InsertOutcome> {
        let mut inner = self.inner.lock().await;
        let key = (record.flight_id.clone(), record.checkpoint, record.tag.clone());
        if let Some((_, existing)) = inner.scans.get(&key) {
            return Ok(InsertOutcome::AlreadyExists(existing.clone()));
        }
        if inner.flight_is_locked(&record.flight_id) {
            return Ok(InsertOutcome::FlightLocked);
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.scans.insert(key, (seq, record.clone()));
        Ok(InsertOutcome::Inserted)
    }

    async fn list(&self, flight_id: &str, checkpoint: Checkpoint) -> Result<Vec<ScanRecord>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<&(u64, ScanRecord)> = inner
            .scans
            .iter()
            .filter(|((f, c, _), _)| f == flight_id && *c == checkpoint)
            .map(|(_, v)| v)
            .collect();
        rows.sort_by(|(seq_a, a), (seq_b, b)| b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a)));
        Ok(rows.into_iter().map(|(_, r)| r.clone()).collect())
    }

    async fn count(&self, flight_id: &str, checkpoint: Checkpoint) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .scans
            .keys()
            .filter(|(f, c, _)| f == flight_id && *c == checkpoint)
            .count() as u64)
    }

    async fn count_by_zone(&self, flight_id: &str) -> Result<BTreeMap<Zone, u64>> {
        let inner = self.inner.lock().await;
        let mut counts = empty_zone_counts();
        for (_, record) in inner.scans.values() {
            if record.flight_id != flight_id || record.checkpoint != Checkpoint::Aircraft {
                continue;
            }
            if let Some(zone) = record.zone {
                *counts.entry(zone).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn delete_page(&self, flight_id: &str, limit: usize) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let victims: Vec<ScanKey> = inner
            .scans
            .keys()
            .filter(|(f, _, _)| f == flight_id)
            .take(limit)
            .cloned()
            .collect();
        for key in &victims {
            inner.scans.remove(key);
        }
        Ok(victims.len())
    }
}
