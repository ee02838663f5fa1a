//! bagtrack-recon library - bag-tag reconciliation engine
//!
//! Decides for each scan whether a tag is accepted or rejected, keeps the
//! global tag index consistent across flights, and drives flight status
//! from OPEN through LOADED.

use axum::Router;
use bagtrack_common::config::ReconciliationConfig;
use chrono::{DateTime, Utc};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod artifacts;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use events::EventBus;
use services::{CascadeDeleter, FlightStatusMachine, ManifestService, ReconciliationEngine};
use store::Stores;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: ReconciliationEngine,
    pub status: FlightStatusMachine,
    pub manifest: ManifestService,
    pub cascade: CascadeDeleter,
    pub events: EventBus,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire every service onto the same stores and event bus
    pub fn new(stores: Stores, events: EventBus, config: &ReconciliationConfig) -> Self {
        let status = FlightStatusMachine::new(stores.clone(), events.clone(), config);
        let manifest = ManifestService::new(stores.clone(), status.clone(), events.clone(), config.clone());
        let engine = ReconciliationEngine::new(
            stores.clone(),
            status.clone(),
            manifest.clone(),
            events.clone(),
            config,
        );
        let cascade = CascadeDeleter::new(stores, events.clone(), config);

        Self {
            engine,
            status,
            manifest,
            cascade,
            events,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let flights = Router::new()
        .route("/flights", post(api::create_flight))
        .route("/flights/:id", get(api::get_flight).delete(api::delete_flight))
        .route("/flights/:id/scans", post(api::submit_scan))
        .route("/flights/:id/scans/:checkpoint", get(api::list_scans))
        .route("/flights/:id/complete", post(api::complete_loading))
        .route("/flights/:id/reopen", post(api::reopen_flight))
        .route("/flights/:id/checked-bags", put(api::set_checked_bags))
        .route("/flights/:id/strict-manifest", put(api::set_strict_manifest))
        .route(
            "/flights/:id/manifest",
            get(api::get_manifest).post(api::import_manifest),
        );

    let tags = Router::new()
        .route("/tags/:tag", get(api::get_tag))
        .route("/tags/:tag/reassign", post(api::reassign_tag));

    Router::new()
        .merge(flights)
        .merge(tags)
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
