//! Global bag tag index records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::flight::{FlightState, FlightSummary};
use super::scan::{Checkpoint, Zone};

/// Current claim on a tag, one per tag across all flights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagTagRecord {
    pub tag: String,
    /// Flight currently owning this tag
    pub flight_id: String,
    pub flight_number: Option<String>,
    pub flight_date: Option<NaiveDate>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_seen_location: Checkpoint,
    /// Set only for aircraft sightings
    pub last_seen_zone: Option<Zone>,
}

impl BagTagRecord {
    pub fn claiming_flight(&self) -> FlightSummary {
        FlightSummary {
            flight_id: self.flight_id.clone(),
            flight_number: self.flight_number.clone(),
            flight_date: self.flight_date,
        }
    }
}

/// Write request for [`crate::store::TagIndex::claim`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagClaim {
    pub tag: String,
    pub flight_id: String,
    pub flight_number: String,
    pub flight_date: NaiveDate,
    pub location: Checkpoint,
    pub zone: Option<Zone>,
    pub seen_at: DateTime<Utc>,
}

impl TagClaim {
    pub fn for_flight(
        flight: &FlightState,
        tag: &str,
        location: Checkpoint,
        zone: Option<Zone>,
        seen_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tag: tag.to_string(),
            flight_id: flight.id.clone(),
            flight_number: flight.flight_number.clone(),
            flight_date: flight.flight_date,
            location,
            zone,
            seen_at,
        }
    }

    /// Record as it looks when first created by this claim
    pub fn to_new_record(&self) -> BagTagRecord {
        BagTagRecord {
            tag: self.tag.clone(),
            flight_id: self.flight_id.clone(),
            flight_number: Some(self.flight_number.clone()),
            flight_date: Some(self.flight_date),
            first_seen_at: self.seen_at,
            last_seen_at: self.seen_at,
            last_seen_location: self.location,
            last_seen_zone: self.zone,
        }
    }

    /// Merge this claim into an existing record, keeping `first_seen_at`
    pub fn merge_into(&self, record: &mut BagTagRecord) {
        record.flight_id = self.flight_id.clone();
        record.flight_number = Some(self.flight_number.clone());
        record.flight_date = Some(self.flight_date);
        record.last_seen_at = self.seen_at;
        record.last_seen_location = self.location;
        record.last_seen_zone = self.zone;
    }
}

/// Result of a conditional claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Created or refreshed for the requesting flight
    Claimed(BagTagRecord),
    /// Another flight holds the tag; nothing was written
    HeldBy(BagTagRecord),
}
