//! Strict manifest allow-list entries

use bagtrack_common::Operator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a manifest list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestSource {
    Manual,
    Ocr,
}

impl ManifestSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestSource::Manual => "manual",
            ManifestSource::Ocr => "ocr",
        }
    }
}

impl fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManifestSource {
    type Err = bagtrack_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ManifestSource::Manual),
            "ocr" => Ok(ManifestSource::Ocr),
            other => Err(bagtrack_common::Error::Internal(format!("Unknown manifest source: '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub flight_id: String,
    pub tag: String,
    pub imported_at: DateTime<Utc>,
    pub imported_by: Operator,
    pub source: Option<ManifestSource>,
}

/// Totals from a manifest import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Tags supplied by the caller, before cleaning and de-duplication
    pub received: usize,
    /// Distinct tags written
    pub imported: usize,
    /// Batch commits issued
    pub pages: usize,
}
