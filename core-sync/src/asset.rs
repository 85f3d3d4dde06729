//! # Synced Asset Mapping
//!
//! Durable link between one DAM asset and the destination file it was imported as,
//! keyed by (tenant, DAM asset id).

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How an asset mapping was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOrigin {
    /// Discovered by a tag-driven job run
    Auto,
    /// Requested explicitly (webhook or single-asset call)
    Manual,
}

impl SyncOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOrigin::Auto => "auto",
            SyncOrigin::Manual => "manual",
        }
    }
}

impl FromStr for SyncOrigin {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(SyncOrigin::Auto),
            "manual" => Ok(SyncOrigin::Manual),
            _ => Err(SyncError::InvalidOrigin(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One DAM asset imported into the destination store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedAsset {
    pub tenant_id: String,
    pub dam_asset_id: String,
    pub file_id: String,
    pub origin: SyncOrigin,
    /// DAM tags at the time of the last import
    pub tags: Vec<String>,
    /// DAM version at the time of the last import; never decreases
    pub dam_version: u64,
    pub synced_at: i64,
}

impl SyncedAsset {
    /// Whether the stored import already covers `version`.
    pub fn is_current_for(&self, version: u64) -> bool {
        self.dam_version >= version
    }
}
