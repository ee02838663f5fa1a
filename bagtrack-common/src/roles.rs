//! Operator identity and role capabilities
//!
//! Roles form a closed set. Every role-gated operation asks the capability
//! matrix here instead of comparing role strings at the call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Station role of an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Enters the checked-bag total at the gate counter
    GateController,
    /// Scans bags received in the bagroom
    BagroomAgent,
    /// Scans bags loaded into the aircraft holds
    RampAgent,
    Supervisor,
    DutyManager,
    StationManager,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::GateController,
        Role::BagroomAgent,
        Role::RampAgent,
        Role::Supervisor,
        Role::DutyManager,
        Role::StationManager,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::GateController => "gate_controller",
            Role::BagroomAgent => "bagroom_agent",
            Role::RampAgent => "ramp_agent",
            Role::Supervisor => "supervisor",
            Role::DutyManager => "duty_manager",
            Role::StationManager => "station_manager",
        }
    }

    fn is_manager(&self) -> bool {
        matches!(self, Role::DutyManager | Role::StationManager)
    }

    /// May set or change the checked-bags total
    pub fn can_edit_gate_total(&self) -> bool {
        matches!(self, Role::GateController | Role::Supervisor) || self.is_manager()
    }

    /// May mark aircraft loading complete
    pub fn can_complete(&self) -> bool {
        matches!(self, Role::RampAgent | Role::Supervisor) || self.is_manager()
    }

    /// May toggle strict manifest mode and import manifests
    pub fn can_edit_manifest(&self) -> bool {
        matches!(self, Role::Supervisor) || self.is_manager()
    }

    /// May reopen a LOADED flight
    pub fn can_reopen(&self) -> bool {
        self.is_manager()
    }

    /// May cascade-delete a flight
    pub fn can_delete_flight(&self) -> bool {
        self.is_manager()
    }

    /// May move a tag claim to another flight
    pub fn can_reassign_tag(&self) -> bool {
        self.is_manager()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    /// Parses a role name, ignoring case and surrounding whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown role: '{}'", s.trim())))
    }
}

/// The acting operator recorded on every write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: String,
    pub username: String,
    pub role: Role,
}

impl Operator {
    pub fn new(id: impl Into<String>, username: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            role,
        }
    }
}
