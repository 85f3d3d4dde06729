//! # Asset Uploader
//!
//! Transfers one DAM asset into the destination store: download URL, bytes,
//! templated path, upload, then the metadata write that links the destination
//! file back to the DAM asset.

use crate::Result;
use bridge_traits::dam::DamAssetMetadata;
use bridge_traits::destination::{AssetMetadataFields, UploadRequest, UploadedFile};
use bridge_traits::naming::AssetPathTemplater;
use bridge_traits::tenant::{NamingOptions, TenantClients};
use bridge_traits::time::Clock;
use core_runtime::logging::strip_query;
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_TEMPLATE: &str = "{name}.{extension}";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// Path Templating
// ============================================================================

/// Default `AssetPathTemplater` understanding `{name}`, `{id}`, `{version}`
/// and `{extension}`.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderTemplater;

impl PlaceholderTemplater {
    pub fn new() -> Self {
        Self
    }
}

impl AssetPathTemplater for PlaceholderTemplater {
    fn render(&self, asset: &DamAssetMetadata, options: &NamingOptions) -> String {
        let template = options
            .path_template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TEMPLATE);

        let extension = asset_extension(asset).unwrap_or_default();
        let name = base_name(&asset.name, &extension);

        let rendered = template
            .replace("{name}", &sanitize_segment(&name))
            .replace("{id}", &sanitize_segment(&asset.id))
            .replace("{version}", &asset.version.to_string())
            .replace("{extension}", &sanitize_segment(&extension));
        let rendered = rendered.trim_end_matches('.').trim_start_matches('/');

        match options.folder.as_deref().map(|f| f.trim_matches('/')) {
            Some(folder) if !folder.is_empty() => format!("{}/{}", folder, rendered),
            _ => rendered.to_string(),
        }
    }
}

/// Extension from metadata, falling back to the asset name's suffix
fn asset_extension(asset: &DamAssetMetadata) -> Option<String> {
    asset
        .extension
        .as_deref()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .or_else(|| {
            asset
                .name
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_lowercase())
                .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        })
}

/// Asset name without a trailing `.extension`
fn base_name(name: &str, extension: &str) -> String {
    if extension.is_empty() {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if ext.eq_ignore_ascii_case(extension) && !stem.is_empty() => {
            stem.to_string()
        }
        _ => name.to_string(),
    }
}

/// Placeholder values never introduce new path segments
fn sanitize_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' => '-',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Content type from metadata, else guessed from the extension
pub fn content_type_for(asset: &DamAssetMetadata) -> String {
    if let Some(content_type) = asset.content_type.as_deref().filter(|c| !c.is_empty()) {
        return content_type.to_string();
    }

    let guessed = match asset_extension(asset).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("svg") => "image/svg+xml",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("pdf") => "application/pdf",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        _ => FALLBACK_CONTENT_TYPE,
    };
    guessed.to_string()
}

// ============================================================================
// Uploader
// ============================================================================

/// Performs the transfer half of a single-asset sync
pub struct AssetUploader {
    templater: Arc<dyn AssetPathTemplater>,
    clock: Arc<dyn Clock>,
}

impl AssetUploader {
    pub fn new(templater: Arc<dyn AssetPathTemplater>, clock: Arc<dyn Clock>) -> Self {
        Self { templater, clock }
    }

    /// Download `asset` from the DAM and store it in the destination.
    ///
    /// `clients.dam` is expected to be rate limited by the caller.
    ///
    /// # Errors
    ///
    /// Returns the first collaborator failure; a file uploaded before a
    /// failing metadata write is left in place.
    pub async fn upload(
        &self,
        clients: &TenantClients,
        asset: &DamAssetMetadata,
        naming: &NamingOptions,
    ) -> Result<UploadedFile> {
        let url = clients.dam.get_download_url(&asset.id).await?;
        debug!(asset_id = %asset.id, url = %strip_query(&url), "Downloading asset");

        let bytes = clients.dam.download(&url).await?;
        let path = self.templater.render(asset, naming);
        let content_type = content_type_for(asset);
        let alt_text = asset
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| Some(asset.name.clone()));

        debug!(
            asset_id = %asset.id,
            size = bytes.len(),
            path = %path,
            content_type = %content_type,
            "Uploading asset"
        );

        let uploaded = clients
            .destination
            .upload(UploadRequest {
                bytes,
                content_type,
                path,
                alt_text,
            })
            .await?;

        let fields = AssetMetadataFields {
            asset_id: asset.id.clone(),
            permalink: asset.permalink.clone(),
            tags: asset.tags.clone(),
            version: asset.version,
            synced_at: self.clock.unix_timestamp(),
        };
        clients
            .destination
            .set_metadata(&uploaded.file_id, &fields)
            .await?;

        info!(
            asset_id = %asset.id,
            file_id = %uploaded.file_id,
            version = asset.version,
            "Asset uploaded"
        );

        Ok(uploaded)
    }
}
