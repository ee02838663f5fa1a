//! Tag index lookup and privileged reassignment

use axum::{
    extract::{Path, State},
    Json,
};
use bagtrack_common::Operator;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::models::BagTagRecord;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub to_flight_id: String,
    pub operator: Operator,
}

/// GET /tags/:tag
pub async fn get_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> ApiResult<Json<BagTagRecord>> {
    state
        .engine
        .lookup_tag(&tag)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Tag {}", tag)))
}

/// POST /tags/:tag/reassign
pub async fn reassign_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Json(request): Json<ReassignRequest>,
) -> ApiResult<Json<BagTagRecord>> {
    let record = state
        .engine
        .reassign_tag(&tag, &request.to_flight_id, &request.operator)
        .await?;
    Ok(Json(record))
}
