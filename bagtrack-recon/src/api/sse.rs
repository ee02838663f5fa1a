//! Server-Sent Events feed of reconciliation events
//!
//! Optional `?flight_id=` narrows the feed to one flight.

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventFilter {
    #[serde(default)]
    pub flight_id: Option<String>,
}

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(flight_id = ?filter.flight_id, "New SSE client connected");
    let mut rx = state.events.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(flight_id) = filter.flight_id.as_deref() {
                        if event.flight_id() != flight_id {
                            continue;
                        }
                    }
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().event(event.event_type()).data(json)),
                        Err(e) => warn!("Failed to serialize event: {}", e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "SSE client lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
