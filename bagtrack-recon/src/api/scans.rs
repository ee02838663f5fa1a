//! Scan submission and scan lists

use axum::{
    extract::{Path, State},
    Json,
};
use bagtrack_common::Operator;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::models::{Checkpoint, ScanRecord, ScanResult, Zone};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub checkpoint: Checkpoint,
    /// Raw scanner input, cleaned server-side
    pub tag: String,
    #[serde(default)]
    pub zone: Option<u8>,
    pub operator: Operator,
}

/// POST /flights/:id/scans
///
/// Rejections are normal outcomes and come back as 200 with the result.
pub async fn submit_scan(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
    Json(request): Json<ScanRequest>,
) -> ApiResult<Json<ScanResult>> {
    let zone = request.zone.map(Zone::try_from).transpose()?;
    let result = state
        .engine
        .submit_scan(&flight_id, request.checkpoint, &request.tag, zone, &request.operator)
        .await?;
    Ok(Json(result))
}

/// GET /flights/:id/scans/:checkpoint
pub async fn list_scans(
    State(state): State<AppState>,
    Path((flight_id, checkpoint)): Path<(String, String)>,
) -> ApiResult<Json<Vec<ScanRecord>>> {
    let checkpoint: Checkpoint = checkpoint
        .parse()
        .map_err(|e: bagtrack_common::Error| ApiError::BadRequest(e.to_string()))?;
    state.status.get_flight(&flight_id).await?;
    Ok(Json(state.engine.list_scans(&flight_id, checkpoint).await?))
}
