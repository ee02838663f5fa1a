//! Flight status commands and queries

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use bagtrack_common::Operator;
use serde::Deserialize;

use super::OperatorRequest;
use crate::error::ApiResult;
use crate::models::{FlightReport, FlightState, NewFlight};
use crate::services::CascadeReport;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateFlightRequest {
    #[serde(flatten)]
    pub flight: NewFlight,
    pub operator: Operator,
}

#[derive(Debug, Deserialize)]
pub struct CheckedBagsRequest {
    pub total: u32,
    pub operator: Operator,
}

#[derive(Debug, Deserialize)]
pub struct StrictManifestRequest {
    pub enabled: bool,
    pub operator: Operator,
}

/// POST /flights
pub async fn create_flight(
    State(state): State<AppState>,
    Json(request): Json<CreateFlightRequest>,
) -> ApiResult<(StatusCode, Json<FlightState>)> {
    let flight = state.status.create_flight(request.flight, &request.operator).await?;
    Ok((StatusCode::CREATED, Json(flight)))
}

/// GET /flights/:id
pub async fn get_flight(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
) -> ApiResult<Json<FlightReport>> {
    Ok(Json(state.status.flight_report(&flight_id).await?))
}

/// DELETE /flights/:id
pub async fn delete_flight(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
    Json(request): Json<OperatorRequest>,
) -> ApiResult<Json<CascadeReport>> {
    let report = state
        .cascade
        .delete_flight_cascade(&flight_id, &request.operator)
        .await?;
    Ok(Json(report))
}

/// POST /flights/:id/complete
pub async fn complete_loading(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
    Json(request): Json<OperatorRequest>,
) -> ApiResult<Json<FlightState>> {
    Ok(Json(state.status.complete_loading(&flight_id, &request.operator).await?))
}

/// POST /flights/:id/reopen
pub async fn reopen_flight(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
    Json(request): Json<OperatorRequest>,
) -> ApiResult<Json<FlightState>> {
    Ok(Json(state.status.reopen(&flight_id, &request.operator).await?))
}

/// PUT /flights/:id/checked-bags
pub async fn set_checked_bags(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
    Json(request): Json<CheckedBagsRequest>,
) -> ApiResult<Json<FlightState>> {
    let flight = state
        .status
        .set_checked_bags_total(&flight_id, request.total, &request.operator)
        .await?;
    Ok(Json(flight))
}

/// PUT /flights/:id/strict-manifest
pub async fn set_strict_manifest(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
    Json(request): Json<StrictManifestRequest>,
) -> ApiResult<Json<FlightState>> {
    let flight = state
        .status
        .set_strict_manifest(&flight_id, request.enabled, &request.operator)
        .await?;
    Ok(Json(flight))
}
