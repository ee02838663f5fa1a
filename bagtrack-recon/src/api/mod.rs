//! HTTP API handlers for bagtrack-recon
//!
//! Authentication is the caller's job. Every mutating request carries the
//! acting operator in its body, and role-gated commands check it.

pub mod flights;
pub mod health;
pub mod manifest;
pub mod scans;
pub mod sse;
pub mod tags;

pub use flights::{
    complete_loading, create_flight, delete_flight, get_flight, reopen_flight, set_checked_bags,
    set_strict_manifest,
};
pub use health::health_routes;
pub use manifest::{get_manifest, import_manifest};
pub use scans::{list_scans, submit_scan};
pub use sse::event_stream;
pub use tags::{get_tag, reassign_tag};

use bagtrack_common::Operator;
use serde::Deserialize;

/// Body for commands that only need the acting operator
#[derive(Debug, Deserialize)]
pub struct OperatorRequest {
    pub operator: Operator,
}
