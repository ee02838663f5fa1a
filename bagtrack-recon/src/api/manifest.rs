//! Manifest import and listing

use axum::{
    extract::{Path, State},
    Json,
};
use bagtrack_common::Operator;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::{ImportSummary, ManifestEntry, ManifestSource};
use crate::AppState;

/// Either an explicit tag list or free text to extract tags from
#[derive(Debug, Deserialize)]
pub struct ManifestImportRequest {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub source: Option<ManifestSource>,
    pub operator: Operator,
}

#[derive(Debug, Serialize)]
pub struct ManifestResponse {
    pub flight_id: String,
    pub count: usize,
    pub entries: Vec<ManifestEntry>,
}

/// POST /flights/:id/manifest
pub async fn import_manifest(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
    Json(request): Json<ManifestImportRequest>,
) -> ApiResult<Json<ImportSummary>> {
    let summary = match (request.tags, request.text) {
        (Some(tags), None) => {
            state
                .manifest
                .import_batch(&flight_id, &tags, request.source, &request.operator)
                .await?
        }
        (None, Some(text)) => {
            state
                .manifest
                .import_free_text(&flight_id, &text, request.source, &request.operator)
                .await?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "Provide exactly one of 'tags' or 'text'".to_string(),
            ))
        }
    };
    Ok(Json(summary))
}

/// GET /flights/:id/manifest
pub async fn get_manifest(
    State(state): State<AppState>,
    Path(flight_id): Path<String>,
) -> ApiResult<Json<ManifestResponse>> {
    state.status.get_flight(&flight_id).await?;
    let entries = state.manifest.list(&flight_id).await?;
    Ok(Json(ManifestResponse {
        flight_id,
        count: entries.len(),
        entries,
    }))
}
