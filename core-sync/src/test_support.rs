//! In-memory collaborator fakes shared by unit and integration tests.
//!
//! Only depends on `bridge-traits` so `tests/` can include it by path.
#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::dam::{DamAssetMetadata, DamAssetSummary, DamClient};
use bridge_traits::destination::{
    AssetMetadataFields, DestinationStore, UploadRequest, UploadedFile,
};
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::tenant::{
    NamingOptions, TenantClientResolver, TenantClients, TenantConfigProvider, TenantSettings,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const DOWNLOAD_PREFIX: &str = "https://dam.test/download/";

/// Asset `id` named `id` with extension `jpg`
pub fn metadata(id: &str, tags: &[&str], version: u64) -> DamAssetMetadata {
    DamAssetMetadata {
        id: id.to_string(),
        name: id.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        version,
        description: None,
        content_type: None,
        permalink: None,
        extension: Some("jpg".to_string()),
    }
}

/// `BridgeError` is not `Clone`; rebuild an equivalent value
pub fn copy_error(err: &BridgeError) -> BridgeError {
    match err {
        BridgeError::NotAvailable(m) => BridgeError::NotAvailable(m.clone()),
        BridgeError::OperationFailed(m) => BridgeError::OperationFailed(m.clone()),
        BridgeError::Http { status, message } => BridgeError::http(*status, message.clone()),
        BridgeError::Timeout(m) => BridgeError::Timeout(m.clone()),
        BridgeError::NotFound(m) => BridgeError::NotFound(m.clone()),
        BridgeError::Io(e) => BridgeError::OperationFailed(e.to_string()),
    }
}

/// Failure injected for a number of calls (`None` = every call)
struct Injected {
    error: BridgeError,
    remaining: Option<usize>,
}

fn take_failure(failures: &Mutex<HashMap<String, Injected>>, key: &str) -> Option<BridgeError> {
    let mut failures = failures.lock().unwrap();
    let injected = failures.get_mut(key)?;
    let error = copy_error(&injected.error);
    match injected.remaining.as_mut() {
        Some(0) => return None,
        Some(n) => *n -= 1,
        None => {}
    }
    Some(error)
}

// ============================================================================
// DAM
// ============================================================================

#[derive(Default)]
pub struct FakeDam {
    assets: Mutex<Vec<DamAssetMetadata>>,
    list_failures: Mutex<HashMap<String, Injected>>,
    metadata_failures: Mutex<HashMap<String, Injected>>,
    download_failures: Mutex<HashMap<String, Injected>>,
    list_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl FakeDam {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an asset, keeping listing order stable
    pub fn put_asset(&self, asset: DamAssetMetadata) {
        let mut assets = self.assets.lock().unwrap();
        match assets.iter_mut().find(|a| a.id == asset.id) {
            Some(existing) => *existing = asset,
            None => assets.push(asset),
        }
    }

    pub fn fail_listing(&self, tag: &str, error: BridgeError) {
        self.list_failures.lock().unwrap().insert(
            tag.to_string(),
            Injected {
                error,
                remaining: None,
            },
        );
    }

    pub fn fail_metadata(&self, asset_id: &str, error: BridgeError) {
        self.metadata_failures.lock().unwrap().insert(
            asset_id.to_string(),
            Injected {
                error,
                remaining: None,
            },
        );
    }

    pub fn fail_download(&self, asset_id: &str, error: BridgeError) {
        self.download_failures.lock().unwrap().insert(
            asset_id.to_string(),
            Injected {
                error,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` downloads of `asset_id`, then succeed
    pub fn fail_download_times(&self, asset_id: &str, error: BridgeError, times: usize) {
        self.download_failures.lock().unwrap().insert(
            asset_id.to_string(),
            Injected {
                error,
                remaining: Some(times),
            },
        );
    }

    pub fn clear_failures(&self) {
        self.list_failures.lock().unwrap().clear();
        self.metadata_failures.lock().unwrap().clear();
        self.download_failures.lock().unwrap().clear();
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DamClient for FakeDam {
    async fn list_assets_by_tag(&self, tag: &str) -> Result<Vec<DamAssetSummary>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = take_failure(&self.list_failures, tag) {
            return Err(err);
        }

        Ok(self
            .assets
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.tags.iter().any(|t| t == tag))
            .map(|a| DamAssetSummary {
                id: a.id.clone(),
                tags: a.tags.clone(),
                version: a.version,
            })
            .collect())
    }

    async fn get_asset_metadata(&self, asset_id: &str) -> Result<DamAssetMetadata> {
        if let Some(err) = take_failure(&self.metadata_failures, asset_id) {
            return Err(err);
        }

        self.assets
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == asset_id)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("asset {}", asset_id)))
    }

    async fn get_download_url(&self, asset_id: &str) -> Result<String> {
        Ok(format!("{}{}?token=secret", DOWNLOAD_PREFIX, asset_id))
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let asset_id = url
            .trim_start_matches(DOWNLOAD_PREFIX)
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();

        if let Some(err) = take_failure(&self.download_failures, &asset_id) {
            return Err(err);
        }
        Ok(Bytes::from(format!("bytes-of-{}", asset_id)))
    }
}

// ============================================================================
// Destination
// ============================================================================

#[derive(Default)]
pub struct FakeDestination {
    uploads: Mutex<Vec<UploadRequest>>,
    metadata: Mutex<Vec<(String, AssetMetadataFields)>>,
    upload_failures: Mutex<HashMap<String, Injected>>,
    next_id: AtomicUsize,
}

impl FakeDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every upload to `path`
    pub fn fail_upload(&self, path: &str, error: BridgeError) {
        self.upload_failures.lock().unwrap().insert(
            path.to_string(),
            Injected {
                error,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` uploads to `path`, then succeed
    pub fn fail_upload_times(&self, path: &str, error: BridgeError, times: usize) {
        self.upload_failures.lock().unwrap().insert(
            path.to_string(),
            Injected {
                error,
                remaining: Some(times),
            },
        );
    }

    pub fn clear_failures(&self) {
        self.upload_failures.lock().unwrap().clear();
    }

    pub fn uploads(&self) -> Vec<UploadRequest> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn upload_paths(&self) -> Vec<String> {
        self.uploads().into_iter().map(|u| u.path).collect()
    }

    pub fn metadata_writes(&self) -> Vec<(String, AssetMetadataFields)> {
        self.metadata.lock().unwrap().clone()
    }
}

#[async_trait]
impl DestinationStore for FakeDestination {
    async fn upload(&self, request: UploadRequest) -> Result<UploadedFile> {
        if let Some(err) = take_failure(&self.upload_failures, &request.path) {
            return Err(err);
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let file_id = format!("file-{}", n);
        let file_url = format!("https://cdn.test/{}", request.path);
        self.uploads.lock().unwrap().push(request);

        Ok(UploadedFile { file_id, file_url })
    }

    async fn set_metadata(&self, file_id: &str, fields: &AssetMetadataFields) -> Result<()> {
        self.metadata
            .lock()
            .unwrap()
            .push((file_id.to_string(), fields.clone()));
        Ok(())
    }
}

// ============================================================================
// Tenant configuration
// ============================================================================

#[derive(Default)]
pub struct StaticTenantConfig {
    tenants: Mutex<HashMap<String, TenantSettings>>,
}

impl StaticTenantConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(self, tenant_id: &str, tags: &[&str]) -> Self {
        self.set_tags(tenant_id, tags);
        self
    }

    pub fn set_tags(&self, tenant_id: &str, tags: &[&str]) {
        self.tenants.lock().unwrap().insert(
            tenant_id.to_string(),
            TenantSettings {
                tenant_id: tenant_id.to_string(),
                sync_tags: tags.iter().map(|t| t.to_string()).collect(),
                naming: NamingOptions::default(),
            },
        );
    }
}

#[async_trait]
impl TenantConfigProvider for StaticTenantConfig {
    async fn settings(&self, tenant_id: &str) -> Result<Option<TenantSettings>> {
        Ok(self.tenants.lock().unwrap().get(tenant_id).cloned())
    }
}

#[derive(Default)]
pub struct StaticResolver {
    clients: Mutex<HashMap<String, TenantClients>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clients(
        self,
        tenant_id: &str,
        dam: Arc<dyn DamClient>,
        destination: Arc<dyn DestinationStore>,
    ) -> Self {
        self.set_clients(tenant_id, TenantClients { dam, destination });
        self
    }

    pub fn set_clients(&self, tenant_id: &str, clients: TenantClients) {
        self.clients
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), clients);
    }
}

#[async_trait]
impl TenantClientResolver for StaticResolver {
    async fn resolve(&self, tenant_id: &str) -> Result<Option<TenantClients>> {
        Ok(self.clients.lock().unwrap().get(tenant_id).cloned())
    }
}
