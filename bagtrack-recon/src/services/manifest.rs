//! Strict manifest allow-lists
//!
//! Imports are split into pages of `batch_page_size` upserts. Each page is
//! idempotent, so an interrupted import is resumed by running it again.

use bagtrack_common::config::ReconciliationConfig;
use bagtrack_common::{time, Operator};
use std::collections::HashSet;
use tracing::{debug, info};

use super::require;
use crate::error::ReconResult;
use crate::events::{BagEvent, EventBus};
use crate::models::{FlightState, ImportSummary, ManifestEntry, ManifestSource};
use crate::services::FlightStatusMachine;
use crate::store::Stores;
use crate::utils::{clean_tag, extract_tags_from_free_text};

#[derive(Clone)]
pub struct ManifestService {
    stores: Stores,
    status: FlightStatusMachine,
    events: EventBus,
    config: ReconciliationConfig,
}

impl ManifestService {
    pub fn new(
        stores: Stores,
        status: FlightStatusMachine,
        events: EventBus,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            stores,
            status,
            events,
            config,
        }
    }

    /// Whether `tag` may be scanned for the flight
    ///
    /// Always true unless strict manifest mode is on.
    pub async fn is_allowed(&self, flight_id: &str, tag: &str) -> ReconResult<bool> {
        let flight = self.status.get_flight(flight_id).await?;
        self.is_allowed_for(&flight, tag).await
    }

    pub(crate) async fn is_allowed_for(&self, flight: &FlightState, tag: &str) -> ReconResult<bool> {
        if !flight.strict_manifest {
            return Ok(true);
        }
        Ok(self.stores.manifests.contains(&flight.id, tag).await?)
    }

    /// Candidate tags from pasted, uploaded or OCR text
    pub fn extract_tags(&self, text: &str) -> Vec<String> {
        extract_tags_from_free_text(
            text,
            self.config.manifest_min_tag_length,
            self.config.manifest_max_tag_length,
        )
    }

    /// Bulk upsert tags into the flight's manifest
    pub async fn import_batch(
        &self,
        flight_id: &str,
        tags: &[String],
        source: Option<ManifestSource>,
        operator: &Operator,
    ) -> ReconResult<ImportSummary> {
        require(operator, operator.role.can_edit_manifest(), "import manifests")?;
        let flight = self.status.get_flight(flight_id).await?;

        let mut seen = HashSet::new();
        let unique: Vec<String> = tags
            .iter()
            .map(|raw| clean_tag(raw))
            .filter(|tag| !tag.is_empty())
            .filter(|tag| seen.insert(tag.clone()))
            .collect();

        let imported_at = time::now();
        let mut pages = 0;
        for chunk in unique.chunks(self.config.batch_page_size.max(1)) {
            let entries: Vec<ManifestEntry> = chunk
                .iter()
                .map(|tag| ManifestEntry {
                    flight_id: flight.id.clone(),
                    tag: tag.clone(),
                    imported_at,
                    imported_by: operator.clone(),
                    source,
                })
                .collect();

            self.stores.manifests.upsert_page(&entries).await?;
            pages += 1;
            debug!(flight_id = %flight.id, page = pages, size = entries.len(), "Manifest page written");
        }

        let summary = ImportSummary {
            received: tags.len(),
            imported: unique.len(),
            pages,
        };

        info!(
            flight_id = %flight.id,
            received = summary.received,
            imported = summary.imported,
            pages = summary.pages,
            imported_by = %operator.username,
            "Manifest imported"
        );
        self.events.emit_lossy(BagEvent::ManifestImported {
            flight_id: flight.id.clone(),
            imported: summary.imported,
            timestamp: imported_at,
        });

        Ok(summary)
    }

    /// Extract tags from free text and import them
    pub async fn import_free_text(
        &self,
        flight_id: &str,
        text: &str,
        source: Option<ManifestSource>,
        operator: &Operator,
    ) -> ReconResult<ImportSummary> {
        let tags = self.extract_tags(text);
        self.import_batch(flight_id, &tags, source, operator).await
    }

    pub async fn list(&self, flight_id: &str) -> ReconResult<Vec<ManifestEntry>> {
        Ok(self.stores.manifests.list(flight_id).await?)
    }

    pub async fn count(&self, flight_id: &str) -> ReconResult<u64> {
        Ok(self.stores.manifests.count(flight_id).await?)
    }
}
