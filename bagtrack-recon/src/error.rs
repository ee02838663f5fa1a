//! Error types for bagtrack-recon
//!
//! Scan rejections are not errors; they are [`crate::models::ScanResult`]
//! variants. Errors here are refused commands and infrastructure failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bagtrack_common::Role;
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::TransitionError;

/// Service-level error
#[derive(Debug, Error)]
pub enum ReconError {
    /// Store or configuration failure
    #[error(transparent)]
    Storage(#[from] bagtrack_common::Error),

    #[error("Flight not found: {0}")]
    FlightNotFound(String),

    /// Status command refused; recoverable
    #[error(transparent)]
    PreconditionFailed(#[from] TransitionError),

    #[error("Role {role} may not {action}")]
    PermissionDenied { role: Role, action: &'static str },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Flight kept changing under concurrent updates; safe to retry
    #[error("Flight {0} is being updated concurrently, retry")]
    Contention(String),
}

impl ReconError {
    /// True for failures the caller may retry unchanged
    pub fn is_retriable(&self) -> bool {
        match self {
            ReconError::Storage(err) => err.is_retriable(),
            ReconError::Contention(_) => true,
            _ => false,
        }
    }
}

/// Result type for reconciliation services
pub type ReconResult<T> = Result<T, ReconError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Role lacks the capability (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Precondition failed (409), with details for the operator
    #[error("Precondition failed: {message}")]
    Precondition { message: String, details: Value },

    /// Retriable failure (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

fn precondition_details(err: &TransitionError) -> Value {
    match err {
        TransitionError::MissingGateTotal => json!({ "reason": "missing_gate_total" }),
        TransitionError::BagsMissing { missing, expected, scanned } => json!({
            "reason": "bags_missing",
            "missing": missing,
            "expected": expected,
            "scanned": scanned,
        }),
        TransitionError::ExcessBags { excess, expected, scanned } => json!({
            "reason": "excess_bags",
            "excess": excess,
            "expected": expected,
            "scanned": scanned,
        }),
        TransitionError::NotLoaded { status } => json!({
            "reason": "not_loaded",
            "status": status,
        }),
    }
}

impl From<ReconError> for ApiError {
    fn from(err: ReconError) -> Self {
        let message = err.to_string();
        if err.is_retriable() {
            return ApiError::Unavailable(message);
        }
        match err {
            ReconError::FlightNotFound(_) => ApiError::NotFound(message),
            ReconError::Storage(bagtrack_common::Error::NotFound(msg)) => ApiError::NotFound(msg),
            ReconError::Storage(bagtrack_common::Error::InvalidInput(msg)) | ReconError::InvalidInput(msg) => {
                ApiError::BadRequest(msg)
            }
            ReconError::PermissionDenied { .. } => ApiError::Forbidden(message),
            ReconError::PreconditionFailed(transition) => ApiError::Precondition {
                details: precondition_details(&transition),
                message,
            },
            _ => ApiError::Internal(message),
        }
    }
}

impl From<bagtrack_common::Error> for ApiError {
    fn from(err: bagtrack_common::Error) -> Self {
        ReconError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, None),
            ApiError::Precondition { message, details } => {
                (StatusCode::CONFLICT, "PRECONDITION_FAILED", message, Some(details))
            }
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg, None),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg, None),
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
