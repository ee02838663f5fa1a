//! Reconciliation event broadcasting
//!
//! Events are advisory and lossy: nothing in the reconciliation path depends
//! on a subscriber being present.

use bagtrack_common::Role;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{Checkpoint, FlightStatus, Zone};

/// Default channel capacity for the event bus
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Events published to dashboards over SSE
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BagEvent {
    ScanAccepted {
        flight_id: String,
        checkpoint: Checkpoint,
        tag: String,
        zone: Option<Zone>,
        username: String,
        timestamp: DateTime<Utc>,
    },
    ScanRejected {
        flight_id: String,
        checkpoint: Checkpoint,
        tag: String,
        /// Outcome label, e.g. `duplicate`
        reason: String,
        timestamp: DateTime<Utc>,
    },
    FlightStatusChanged {
        flight_id: String,
        old_status: FlightStatus,
        new_status: FlightStatus,
        timestamp: DateTime<Utc>,
    },
    ManifestImported {
        flight_id: String,
        imported: usize,
        timestamp: DateTime<Utc>,
    },
    TagReassigned {
        tag: String,
        from_flight_id: String,
        to_flight_id: String,
        role: Role,
        timestamp: DateTime<Utc>,
    },
    FlightDeleted {
        flight_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl BagEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            BagEvent::ScanAccepted { .. } => "ScanAccepted",
            BagEvent::ScanRejected { .. } => "ScanRejected",
            BagEvent::FlightStatusChanged { .. } => "FlightStatusChanged",
            BagEvent::ManifestImported { .. } => "ManifestImported",
            BagEvent::TagReassigned { .. } => "TagReassigned",
            BagEvent::FlightDeleted { .. } => "FlightDeleted",
        }
    }

    pub fn flight_id(&self) -> &str {
        match self {
            BagEvent::ScanAccepted { flight_id, .. }
            | BagEvent::ScanRejected { flight_id, .. }
            | BagEvent::FlightStatusChanged { flight_id, .. }
            | BagEvent::ManifestImported { flight_id, .. }
            | BagEvent::FlightDeleted { flight_id, .. } => flight_id,
            BagEvent::TagReassigned { to_flight_id, .. } => to_flight_id,
        }
    }
}

/// Broadcast channel for [`BagEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BagEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receiver for events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<BagEvent> {
        self.tx.subscribe()
    }

    /// Emit, ignoring the case where nobody is listening
    pub fn emit_lossy(&self, event: BagEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit_lossy(BagEvent::FlightDeleted {
            flight_id: "F1".to_string(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "FlightDeleted");
        assert_eq!(event.flight_id(), "F1");
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit_lossy(BagEvent::FlightDeleted {
            flight_id: "F1".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let event = BagEvent::ManifestImported {
            flight_id: "F1".to_string(),
            imported: 3,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ManifestImported");
        assert_eq!(json["imported"], 3);
    }
}
