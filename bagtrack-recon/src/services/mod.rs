//! Reconciliation services
//!
//! Each service is cheap to clone and shares the same [`crate::store::Stores`].

pub mod cascade;
pub mod flight_status;
pub mod manifest;
pub mod reconciliation;

pub use cascade::{CascadeDeleter, CascadeReport};
pub use flight_status::FlightStatusMachine;
pub use manifest::ManifestService;
pub use reconciliation::ReconciliationEngine;

use bagtrack_common::Operator;

use crate::error::{ReconError, ReconResult};

/// Fail with `PermissionDenied` unless `allowed` holds for the operator's role
pub(crate) fn require(
    operator: &Operator,
    allowed: bool,
    action: &'static str,
) -> ReconResult<()> {
    if allowed {
        Ok(())
    } else {
        Err(ReconError::PermissionDenied {
            role: operator.role,
            action,
        })
    }
}
