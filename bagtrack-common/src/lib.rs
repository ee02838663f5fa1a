//! # Bagtrack Common Library
//!
//! Shared code for the bag-tag reconciliation services including:
//! - Error type shared by storage and service layers
//! - Bootstrap configuration and root folder resolution
//! - SQLite database initialization and default settings
//! - Operator identity and role capability matrix
//! - Timestamp helpers for the database text format

pub mod config;
pub mod db;
pub mod error;
pub mod roles;
pub mod time;

pub use error::{Error, Result};
pub use roles::{Operator, Role};
