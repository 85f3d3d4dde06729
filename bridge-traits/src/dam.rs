//! DAM (Digital Asset Management) Client Abstraction
//!
//! The sync engine reads assets from a remote DAM through this trait. Hosts provide
//! a tenant-scoped implementation (one instance per tenant credentials).

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Asset entry returned by a tag listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamAssetSummary {
    pub id: String,
    pub tags: Vec<String>,
    pub version: u64,
}

/// Full asset metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamAssetMetadata {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub version: u64,
    pub description: Option<String>,
    /// MIME type reported by the DAM, when known
    pub content_type: Option<String>,
    /// Public link back to the asset in the DAM UI
    pub permalink: Option<String>,
    /// Original file extension without the dot (e.g. `jpg`)
    pub extension: Option<String>,
}

impl DamAssetMetadata {
    /// Whether the asset carries at least one of the given tags.
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }
}

/// DAM client trait
///
/// Every method performs one network request. Callers that share a DAM quota
/// should wrap the client with a rate-limiting decorator.
///
/// # Errors
///
/// Implementations should preserve the upstream message (status codes,
/// "Service Unavailable", "timeout", ...) in the returned error, since failure
/// classification is based on that text.
#[async_trait]
pub trait DamClient: Send + Sync {
    /// List assets carrying the given tag.
    async fn list_assets_by_tag(&self, tag: &str) -> Result<Vec<DamAssetSummary>>;

    /// Fetch full metadata for one asset.
    async fn get_asset_metadata(&self, asset_id: &str) -> Result<DamAssetMetadata>;

    /// Resolve a (possibly short-lived) download URL for the asset binary.
    async fn get_download_url(&self, asset_id: &str) -> Result<String>;

    /// Fetch binary content from a download URL.
    async fn download(&self, url: &str) -> Result<Bytes>;
}
