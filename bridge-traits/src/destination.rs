//! Destination Content Store Abstraction
//!
//! Imported assets end up as files in a destination content store. The store
//! handles staging and file creation internally; the engine sees a single upload call.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Upload request for a single file.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Bytes,
    pub content_type: String,
    /// Destination path, including folder and filename
    pub path: String,
    pub alt_text: Option<String>,
}

/// File created in the destination store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_id: String,
    pub file_url: String,
}

/// Metadata fields written onto an uploaded file, linking it back to its DAM asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadataFields {
    pub asset_id: String,
    pub permalink: Option<String>,
    pub tags: Vec<String>,
    pub version: u64,
    /// Unix timestamp (seconds)
    pub synced_at: i64,
}

/// Destination store trait
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Upload bytes and create a file.
    async fn upload(&self, request: UploadRequest) -> Result<UploadedFile>;

    /// Write asset metadata fields onto an existing file.
    async fn set_metadata(&self, file_id: &str, fields: &AssetMetadataFields) -> Result<()>;
}
