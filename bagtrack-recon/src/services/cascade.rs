//! Cascade deletion of a flight and everything derived from it
//!
//! Every step deletes in pages and tolerates already-missing data, so a
//! failed run is finished by running it again. The flight document goes
//! last; a second run that finds it gone still succeeds.

use bagtrack_common::config::ReconciliationConfig;
use bagtrack_common::{time, Error, Operator};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::require;
use crate::artifacts::flight_artifact_prefixes;
use crate::error::ReconResult;
use crate::events::{BagEvent, EventBus};
use crate::store::Stores;

/// What a cascade run removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub flight_id: String,
    pub scans_deleted: usize,
    pub manifest_entries_deleted: usize,
    pub tags_released: usize,
    pub artifacts_deleted: usize,
    /// False when the flight document was already gone
    pub flight_deleted: bool,
}

#[derive(Clone)]
pub struct CascadeDeleter {
    stores: Stores,
    events: EventBus,
    page_size: usize,
}

impl CascadeDeleter {
    pub fn new(stores: Stores, events: EventBus, config: &ReconciliationConfig) -> Self {
        Self {
            stores,
            events,
            page_size: config.batch_page_size.max(1),
        }
    }

    pub async fn delete_flight_cascade(&self, flight_id: &str, operator: &Operator) -> ReconResult<CascadeReport> {
        require(operator, operator.role.can_delete_flight(), "delete flights")?;

        let mut report = CascadeReport {
            flight_id: flight_id.to_string(),
            ..CascadeReport::default()
        };

        loop {
            let deleted = self.stores.scans.delete_page(flight_id, self.page_size).await?;
            report.scans_deleted += deleted;
            if deleted < self.page_size {
                break;
            }
        }

        loop {
            let deleted = self.stores.manifests.delete_page(flight_id, self.page_size).await?;
            report.manifest_entries_deleted += deleted;
            if deleted < self.page_size {
                break;
            }
        }

        report.tags_released = self
            .stores
            .tags
            .release_all_for_flight(flight_id, self.page_size)
            .await?;

        for prefix in flight_artifact_prefixes(flight_id) {
            match self.stores.artifacts.delete_prefix(&prefix).await {
                Ok(removed) => report.artifacts_deleted += removed,
                Err(e) => warn!(flight_id = %flight_id, prefix = %prefix, "Artifact cleanup failed: {}", e),
            }
        }

        report.flight_deleted = match self.stores.flights.delete(flight_id).await {
            Ok(()) => true,
            Err(Error::NotFound(_)) => {
                debug!(flight_id = %flight_id, "Flight document already deleted");
                false
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            flight_id = %flight_id,
            scans = report.scans_deleted,
            manifest_entries = report.manifest_entries_deleted,
            tags = report.tags_released,
            artifacts = report.artifacts_deleted,
            deleted_by = %operator.username,
            "Flight cascade delete finished"
        );
        self.events.emit_lossy(BagEvent::FlightDeleted {
            flight_id: flight_id.to_string(),
            timestamp: time::now(),
        });

        Ok(report)
    }
}
