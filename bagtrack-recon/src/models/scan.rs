//! Checkpoints, aircraft zones, scan records and scan outcomes

use bagtrack_common::{Error, Operator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::flight::{FlightStatus, FlightSummary};

/// Physical scan location with its own ledger namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checkpoint {
    /// Bags received from check-in
    Bagroom,
    /// Bags loaded onto the aircraft
    Aircraft,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::Bagroom => "bagroom",
            Checkpoint::Aircraft => "aircraft",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Checkpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bagroom" => Ok(Checkpoint::Bagroom),
            "aircraft" => Ok(Checkpoint::Aircraft),
            other => Err(Error::InvalidInput(format!("Unknown checkpoint: '{}'", other))),
        }
    }
}

/// Aircraft cargo-hold subdivision, 1 through 4
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Zone(u8);

impl Zone {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    pub fn new(value: u8) -> Option<Zone> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Zone(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Zone> {
        (Self::MIN..=Self::MAX).map(Zone)
    }
}

impl TryFrom<u8> for Zone {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Zone::new(value).ok_or_else(|| {
            Error::InvalidInput(format!("Zone must be between {} and {}, got {}", Zone::MIN, Zone::MAX, value))
        })
    }
}

impl TryFrom<i64> for Zone {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Zone::new)
            .ok_or_else(|| Error::Internal(format!("Stored zone out of range: {}", value)))
    }
}

impl From<Zone> for u8 {
    fn from(zone: Zone) -> u8 {
        zone.0
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One accepted scan of a tag at a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub flight_id: String,
    pub checkpoint: Checkpoint,
    pub tag: String,
    pub created_at: DateTime<Utc>,
    pub scanned_by: Operator,
    /// Present exactly when `checkpoint` is aircraft
    pub zone: Option<Zone>,
}

/// Result of a create-only scan insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    /// The key already existed; carries the stored record
    AlreadyExists(ScanRecord),
    /// The flight was LOADED or completed when the insert ran
    FlightLocked,
}

/// Why scanner input was dropped without a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IgnoredInput {
    Empty,
    /// Likely a partial read while the scanner was still transmitting
    TooShort { length: usize, min_length: usize },
}

/// Outcome of a scan submission
///
/// Rejections are business outcomes shown to the operator, not faults.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanResult {
    Accepted {
        record: ScanRecord,
        status: FlightStatus,
    },
    Ignored {
        reason: IgnoredInput,
    },
    RejectedDuplicate {
        previous: ScanRecord,
        message: String,
    },
    RejectedManifestViolation {
        tag: String,
        flight: FlightSummary,
        message: String,
    },
    RejectedCrossFlight {
        tag: String,
        scanned: FlightSummary,
        registered: FlightSummary,
        message: String,
    },
    RejectedFlightLocked {
        flight: FlightSummary,
        message: String,
    },
}

impl ScanResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ScanResult::Accepted { .. })
    }

    pub fn is_rejected(&self) -> bool {
        !matches!(self, ScanResult::Accepted { .. } | ScanResult::Ignored { .. })
    }

    /// Short machine-readable label, used in logs and events
    pub fn label(&self) -> &'static str {
        match self {
            ScanResult::Accepted { .. } => "accepted",
            ScanResult::Ignored { .. } => "ignored",
            ScanResult::RejectedDuplicate { .. } => "duplicate",
            ScanResult::RejectedManifestViolation { .. } => "manifest_violation",
            ScanResult::RejectedCrossFlight { .. } => "cross_flight",
            ScanResult::RejectedFlightLocked { .. } => "flight_locked",
        }
    }

    /// Operator-facing message for rejections
    pub fn message(&self) -> Option<&str> {
        match self {
            ScanResult::RejectedDuplicate { message, .. }
            | ScanResult::RejectedManifestViolation { message, .. }
            | ScanResult::RejectedCrossFlight { message, .. }
            | ScanResult::RejectedFlightLocked { message, .. } => Some(message),
            ScanResult::Accepted { .. } | ScanResult::Ignored { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_bounds() {
        assert!(Zone::new(0).is_none());
        assert_eq!(Zone::new(1).map(Zone::get), Some(1));
        assert_eq!(Zone::new(4).map(Zone::get), Some(4));
        assert!(Zone::new(5).is_none());
        assert_eq!(Zone::all().count(), 4);
    }

    #[test]
    fn test_zone_deserialize_rejects_out_of_range() {
        assert_eq!(serde_json::from_str::<Zone>("2").unwrap(), Zone::new(2).unwrap());
        assert!(serde_json::from_str::<Zone>("7").is_err());
    }

    #[test]
    fn test_checkpoint_parse() {
        assert_eq!("Aircraft".parse::<Checkpoint>().unwrap(), Checkpoint::Aircraft);
        assert_eq!(" bagroom".parse::<Checkpoint>().unwrap(), Checkpoint::Bagroom);
        assert!("counter".parse::<Checkpoint>().is_err());
    }

    #[test]
    fn test_result_serializes_with_outcome_tag() {
        let result = ScanResult::Ignored {
            reason: IgnoredInput::TooShort { length: 3, min_length: 6 },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "ignored");
        assert_eq!(json["reason"]["kind"], "too_short");
        assert!(!result.is_rejected());
        assert!(!result.is_accepted());
    }
}
