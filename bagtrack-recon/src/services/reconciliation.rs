//! Scan submission pipeline
//!
//! Checks run in a fixed order and the first failing check decides the
//! result: lock, input normalization, manifest, cross-flight, duplicate.
//! The cross-flight and duplicate reads are fast paths for operator
//! feedback only. The commit itself is two conditional writes:
//!
//! 1. claim the tag in the global index (succeeds only if unclaimed or
//!    already claimed by this flight)
//! 2. create-only insert of the scan record
//!
//! A concurrent submission that slips past the reads loses at one of these
//! writes and gets the same rejection it would have seen from the read.
//! Claiming first means a scan record never exists for a tag owned by
//! another flight. The insert is also refused once the flight is locked, so
//! a completion that lands after the lock check still wins; the claim made
//! for a refused or failed insert is released again.

use bagtrack_common::config::ReconciliationConfig;
use bagtrack_common::{time, Error, Operator};
use tracing::{debug, info, warn};

use super::require;
use crate::error::{ReconError, ReconResult};
use crate::events::{BagEvent, EventBus};
use crate::models::{
    BagTagRecord, Checkpoint, ClaimOutcome, FlightState, InsertOutcome, ScanRecord, ScanResult,
    TagClaim, Zone,
};
use crate::services::{FlightStatusMachine, ManifestService};
use crate::store::Stores;
use crate::utils::{clean_tag, normalize_scanned_tag};

#[derive(Clone)]
pub struct ReconciliationEngine {
    stores: Stores,
    status: FlightStatusMachine,
    manifests: ManifestService,
    events: EventBus,
    min_tag_length: usize,
}

impl ReconciliationEngine {
    pub fn new(
        stores: Stores,
        status: FlightStatusMachine,
        manifests: ManifestService,
        events: EventBus,
        config: &ReconciliationConfig,
    ) -> Self {
        Self {
            stores,
            status,
            manifests,
            events,
            min_tag_length: config.min_tag_length,
        }
    }

    /// Validate and record one scan
    ///
    /// Rejections come back as `Ok(ScanResult::Rejected*)`. `Err` is reserved
    /// for unknown flights, a missing aircraft zone, and store failures.
    pub async fn submit_scan(
        &self,
        flight_id: &str,
        checkpoint: Checkpoint,
        raw_tag: &str,
        zone: Option<Zone>,
        operator: &Operator,
    ) -> ReconResult<ScanResult> {
        let flight = self.status.get_flight(flight_id).await?;

        if flight.is_locked() {
            return Ok(self.locked(&flight, checkpoint, &clean_tag(raw_tag)));
        }

        let tag = match normalize_scanned_tag(raw_tag, self.min_tag_length) {
            Ok(tag) => tag,
            Err(reason) => {
                debug!(flight_id = %flight.id, checkpoint = %checkpoint, ?reason, "Scanner input ignored");
                return Ok(ScanResult::Ignored { reason });
            }
        };

        let zone = match (checkpoint, zone) {
            (Checkpoint::Aircraft, Some(zone)) => Some(zone),
            (Checkpoint::Aircraft, None) => {
                return Err(ReconError::InvalidInput(format!(
                    "Aircraft scans require a zone between {} and {}",
                    Zone::MIN,
                    Zone::MAX
                )))
            }
            (Checkpoint::Bagroom, _) => None,
        };

        if !self.manifests.is_allowed_for(&flight, &tag).await? {
            let result = ScanResult::RejectedManifestViolation {
                message: format!("Tag {} is not on the manifest for flight {}.", tag, flight.summary()),
                tag: tag.clone(),
                flight: flight.summary(),
            };
            warn!(flight_id = %flight.id, checkpoint = %checkpoint, tag = %tag, "Scan refused, not on manifest");
            self.announce_rejection(&flight.id, checkpoint, &tag, &result);
            return Ok(result);
        }

        if let Some(holder) = self.stores.tags.lookup(&tag).await? {
            if holder.flight_id != flight.id {
                return Ok(self.cross_flight(&flight, checkpoint, &tag, &holder));
            }
        }

        if let Some(previous) = self.stores.scans.find(&flight.id, checkpoint, &tag).await? {
            return Ok(self.duplicate(&flight, checkpoint, previous));
        }

        let now = time::now();
        let claim = TagClaim::for_flight(&flight, &tag, checkpoint, zone, now);
        if let ClaimOutcome::HeldBy(holder) = self.stores.tags.claim(&claim).await? {
            debug!(tag = %tag, "Lost tag claim race");
            return Ok(self.cross_flight(&flight, checkpoint, &tag, &holder));
        }

        let record = ScanRecord {
            flight_id: flight.id.clone(),
            checkpoint,
            tag: tag.clone(),
            created_at: now,
            scanned_by: operator.clone(),
            zone,
        };
        match self.stores.scans.insert_new(&record).await {
            Ok(InsertOutcome::Inserted) => {}
            Ok(InsertOutcome::AlreadyExists(previous)) => {
                debug!(tag = %tag, "Lost scan insert race");
                return Ok(self.duplicate(&flight, checkpoint, previous));
            }
            Ok(InsertOutcome::FlightLocked) => {
                self.release_claim(&claim).await;
                let current = self.status.get_flight(&flight.id).await?;
                return Ok(self.locked(&current, checkpoint, &tag));
            }
            Err(e) => {
                self.release_claim(&claim).await;
                return Err(e.into());
            }
        }

        let updated = self.status.record_scan(&flight.id, checkpoint).await?;

        info!(
            flight_id = %flight.id,
            checkpoint = %checkpoint,
            tag = %tag,
            zone = ?zone.map(Zone::get),
            scanned_by = %operator.username,
            status = %updated.status,
            "Scan accepted"
        );
        self.events.emit_lossy(BagEvent::ScanAccepted {
            flight_id: flight.id.clone(),
            checkpoint,
            tag,
            zone,
            username: operator.username.clone(),
            timestamp: now,
        });

        Ok(ScanResult::Accepted {
            record,
            status: updated.status,
        })
    }

    /// Scans for a checkpoint, newest first
    pub async fn list_scans(&self, flight_id: &str, checkpoint: Checkpoint) -> ReconResult<Vec<ScanRecord>> {
        Ok(self.stores.scans.list(flight_id, checkpoint).await?)
    }

    pub async fn lookup_tag(&self, raw_tag: &str) -> ReconResult<Option<BagTagRecord>> {
        Ok(self.stores.tags.lookup(&clean_tag(raw_tag)).await?)
    }

    /// Move a tag's claim to another flight
    ///
    /// Privileged and never part of the scan flow. Scan records stay with
    /// the flights that made them.
    pub async fn reassign_tag(
        &self,
        raw_tag: &str,
        to_flight_id: &str,
        operator: &Operator,
    ) -> ReconResult<BagTagRecord> {
        require(operator, operator.role.can_reassign_tag(), "reassign tags")?;

        let tag = clean_tag(raw_tag);
        let target = self.status.get_flight(to_flight_id).await?;
        let current = self
            .stores
            .tags
            .lookup(&tag)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Tag {}", tag)))?;

        let claim = TagClaim::for_flight(
            &target,
            &tag,
            current.last_seen_location,
            current.last_seen_zone,
            time::now(),
        );
        let record = self
            .stores
            .tags
            .reassign(&claim)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Tag {}", tag)))?;

        warn!(
            tag = %tag,
            from = %current.flight_id,
            to = %target.id,
            reassigned_by = %operator.username,
            "Tag claim reassigned"
        );
        self.events.emit_lossy(BagEvent::TagReassigned {
            tag,
            from_flight_id: current.flight_id,
            to_flight_id: target.id,
            role: operator.role,
            timestamp: claim.seen_at,
        });

        Ok(record)
    }

    /// Undo a claim made for a scan that was not recorded
    ///
    /// Only a claim this call created and no scan record backs is removed.
    /// Failure leaves the claim in place; retrying the scan repairs it.
    async fn release_claim(&self, claim: &TagClaim) {
        match self.stores.tags.release_unbacked(claim).await {
            Ok(true) => debug!(tag = %claim.tag, flight_id = %claim.flight_id, "Released unrecorded tag claim"),
            Ok(false) => {}
            Err(e) => warn!(tag = %claim.tag, flight_id = %claim.flight_id, "Failed to release tag claim: {}", e),
        }
    }

    fn locked(&self, flight: &FlightState, checkpoint: Checkpoint, tag: &str) -> ScanResult {
        let message = format!(
            "Flight {} is {}. {} scanning is closed until a manager reopens it.",
            flight.summary(),
            flight.status,
            checkpoint
        );
        warn!(flight_id = %flight.id, checkpoint = %checkpoint, "Scan refused, flight locked");
        let result = ScanResult::RejectedFlightLocked {
            flight: flight.summary(),
            message,
        };
        self.announce_rejection(&flight.id, checkpoint, tag, &result);
        result
    }

    fn cross_flight(
        &self,
        flight: &FlightState,
        checkpoint: Checkpoint,
        tag: &str,
        holder: &BagTagRecord,
    ) -> ScanResult {
        let scanned = flight.summary();
        let registered = holder.claiming_flight();
        let message = format!(
            "This bag tag belongs to a different flight/date.\n\nScanned flight: {}\nRegistered flight: {}",
            scanned, registered
        );
        warn!(
            flight_id = %flight.id,
            checkpoint = %checkpoint,
            tag = %tag,
            registered_flight_id = %holder.flight_id,
            "Scan refused, tag claimed by another flight"
        );

        let result = ScanResult::RejectedCrossFlight {
            tag: tag.to_string(),
            scanned,
            registered,
            message,
        };
        self.announce_rejection(&flight.id, checkpoint, tag, &result);
        result
    }

    fn duplicate(&self, flight: &FlightState, checkpoint: Checkpoint, previous: ScanRecord) -> ScanResult {
        let mut message = format!(
            "Tag {} was already scanned at the {} by {} at {}",
            previous.tag,
            checkpoint,
            previous.scanned_by.username,
            previous.created_at.format("%H:%M:%S"),
        );
        if let Some(zone) = previous.zone {
            message.push_str(&format!(" (zone {})", zone));
        }
        message.push('.');

        info!(flight_id = %flight.id, checkpoint = %checkpoint, tag = %previous.tag, "Duplicate scan");
        let tag = previous.tag.clone();
        let result = ScanResult::RejectedDuplicate { previous, message };
        self.announce_rejection(&flight.id, checkpoint, &tag, &result);
        result
    }

    fn announce_rejection(&self, flight_id: &str, checkpoint: Checkpoint, tag: &str, result: &ScanResult) {
        self.events.emit_lossy(BagEvent::ScanRejected {
            flight_id: flight_id.to_string(),
            checkpoint,
            tag: tag.to_string(),
            reason: result.label().to_string(),
            timestamp: time::now(),
        });
    }
}
