//! Tenant Configuration
//!
//! Per-tenant settings (sync tags, naming options) and the resolver that builds
//! tenant-scoped DAM and destination clients.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dam::DamClient;
use crate::destination::DestinationStore;
use crate::error::Result;

/// Options controlling destination paths for imported assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingOptions {
    /// Filename template; `None` uses the default `{name}.{extension}`
    pub path_template: Option<String>,
    /// Destination folder prefix
    pub folder: Option<String>,
}

/// Tenant sync settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSettings {
    pub tenant_id: String,
    /// Ordered set of tags; an asset is in scope iff it carries at least one
    pub sync_tags: Vec<String>,
    #[serde(default)]
    pub naming: NamingOptions,
}

impl TenantSettings {
    pub fn has_tags(&self) -> bool {
        !self.sync_tags.is_empty()
    }
}

/// Read-only tenant configuration source.
#[async_trait]
pub trait TenantConfigProvider: Send + Sync {
    /// Settings for a tenant, or `None` when the tenant is not configured.
    async fn settings(&self, tenant_id: &str) -> Result<Option<TenantSettings>>;
}

/// Tenant-scoped collaborator clients.
#[derive(Clone)]
pub struct TenantClients {
    pub dam: Arc<dyn DamClient>,
    pub destination: Arc<dyn DestinationStore>,
}

impl std::fmt::Debug for TenantClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantClients").finish_non_exhaustive()
    }
}

/// Builds tenant-scoped clients from stored credentials.
#[async_trait]
pub trait TenantClientResolver: Send + Sync {
    /// Clients for a tenant, or `None` when required credentials are missing.
    async fn resolve(&self, tenant_id: &str) -> Result<Option<TenantClients>>;
}
