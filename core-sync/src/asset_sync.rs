//! # Single-Asset Sync
//!
//! Brings one DAM asset up to date in the destination store.
//!
//! ## Steps
//!
//! 1. Load the tenant's tag configuration; no tags means nothing is in scope.
//! 2. Fetch DAM metadata (tags, version).
//! 3. Skip assets carrying none of the configured tags.
//! 4. Skip assets whose stored mapping already has this version or newer.
//! 5. Upload, then upsert the mapping with the new version.
//!
//! Every failure is folded into [`AssetSyncOutcome::Failed`]; nothing is
//! propagated to the caller. Running the same sync twice with unchanged DAM
//! state uploads at most once.

use crate::asset::{SyncOrigin, SyncedAsset};
use crate::classifier;
use crate::job::SyncJobId;
use crate::repository::SyncedAssetRepository;
use crate::uploader::AssetUploader;
use crate::Result;
use bridge_traits::tenant::{TenantClients, TenantConfigProvider};
use bridge_traits::time::Clock;
use core_runtime::events::{AssetEvent, CoreEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Why an asset needed no work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Tenant has no sync tags configured
    NoTagsConfigured,
    /// Asset carries none of the configured tags
    TagsNotMatched,
    /// Stored mapping already covers the DAM version
    UpToDate,
    /// A concurrent writer stored an equal or newer version first
    Superseded,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoTagsConfigured => "no_tags_configured",
            SkipReason::TagsNotMatched => "tags_not_matched",
            SkipReason::UpToDate => "up_to_date",
            SkipReason::Superseded => "superseded",
        }
    }
}

/// Result of one single-asset sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssetSyncOutcome {
    Created { file_id: String, version: u64 },
    Updated { file_id: String, version: u64 },
    Skipped { reason: SkipReason },
    Failed { message: String },
}

impl AssetSyncOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, AssetSyncOutcome::Failed { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            AssetSyncOutcome::Failed { message } => Some(message),
            _ => None,
        }
    }
}

/// Runs single-asset syncs against a tenant's clients
pub struct AssetSynchronizer {
    tenant_config: Arc<dyn TenantConfigProvider>,
    assets: Arc<dyn SyncedAssetRepository>,
    uploader: AssetUploader,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl AssetSynchronizer {
    pub fn new(
        tenant_config: Arc<dyn TenantConfigProvider>,
        assets: Arc<dyn SyncedAssetRepository>,
        uploader: AssetUploader,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            tenant_config,
            assets,
            uploader,
            clock,
            events,
        }
    }

    /// Sync one asset. Never fails; errors are reported in the outcome.
    ///
    /// `clients.dam` is expected to be rate limited by the caller.
    #[instrument(skip(self, clients, job_id), fields(tenant_id = %tenant_id, asset_id = %asset_id))]
    pub async fn sync_asset(
        &self,
        clients: &TenantClients,
        tenant_id: &str,
        asset_id: &str,
        origin: SyncOrigin,
        job_id: Option<&SyncJobId>,
    ) -> AssetSyncOutcome {
        let outcome = match self.try_sync(clients, tenant_id, asset_id, origin).await {
            Ok(outcome) => outcome,
            Err(e) => AssetSyncOutcome::Failed {
                message: e.to_string(),
            },
        };

        self.emit(&outcome, tenant_id, asset_id, job_id);
        outcome
    }

    async fn try_sync(
        &self,
        clients: &TenantClients,
        tenant_id: &str,
        asset_id: &str,
        origin: SyncOrigin,
    ) -> Result<AssetSyncOutcome> {
        let settings = match self.tenant_config.settings(tenant_id).await? {
            Some(settings) if settings.has_tags() => settings,
            _ => {
                debug!("No sync tags configured");
                return Ok(AssetSyncOutcome::Skipped {
                    reason: SkipReason::NoTagsConfigured,
                });
            }
        };

        let metadata = clients.dam.get_asset_metadata(asset_id).await?;
        if !metadata.has_any_tag(&settings.sync_tags) {
            debug!(tags = ?metadata.tags, "Asset carries no configured tag");
            return Ok(AssetSyncOutcome::Skipped {
                reason: SkipReason::TagsNotMatched,
            });
        }

        let existing = self.assets.find(tenant_id, asset_id).await?;
        if let Some(stored) = &existing {
            if stored.is_current_for(metadata.version) {
                debug!(
                    stored_version = stored.dam_version,
                    dam_version = metadata.version,
                    "Asset already up to date"
                );
                return Ok(AssetSyncOutcome::Skipped {
                    reason: SkipReason::UpToDate,
                });
            }
        }

        let uploaded = self
            .uploader
            .upload(clients, &metadata, &settings.naming)
            .await?;

        let record = SyncedAsset {
            tenant_id: tenant_id.to_string(),
            dam_asset_id: asset_id.to_string(),
            file_id: uploaded.file_id.clone(),
            origin,
            tags: metadata.tags.clone(),
            dam_version: metadata.version,
            synced_at: self.clock.unix_timestamp(),
        };

        if !self.assets.upsert(&record).await? {
            warn!(
                file_id = %uploaded.file_id,
                dam_version = metadata.version,
                "Newer mapping stored concurrently; upload superseded"
            );
            return Ok(AssetSyncOutcome::Skipped {
                reason: SkipReason::Superseded,
            });
        }

        Ok(match existing {
            None => AssetSyncOutcome::Created {
                file_id: uploaded.file_id,
                version: metadata.version,
            },
            Some(_) => AssetSyncOutcome::Updated {
                file_id: uploaded.file_id,
                version: metadata.version,
            },
        })
    }

    fn emit(
        &self,
        outcome: &AssetSyncOutcome,
        tenant_id: &str,
        asset_id: &str,
        job_id: Option<&SyncJobId>,
    ) {
        let job_id = job_id.map(|id| id.to_string());
        let tenant_id = tenant_id.to_string();
        let asset_id = asset_id.to_string();

        let event = match outcome {
            AssetSyncOutcome::Created { file_id, version }
            | AssetSyncOutcome::Updated { file_id, version } => {
                AssetEvent::Synced {
                    job_id,
                    tenant_id,
                    asset_id,
                    file_id: file_id.clone(),
                    version: *version,
                    created: matches!(outcome, AssetSyncOutcome::Created { .. }),
                }
            }
            AssetSyncOutcome::Skipped { reason } => AssetEvent::Skipped {
                job_id,
                tenant_id,
                asset_id,
                reason: reason.as_str().to_string(),
            },
            AssetSyncOutcome::Failed { message } => {
                warn!(error = %message, "Asset sync failed");
                AssetEvent::Failed {
                    job_id,
                    tenant_id,
                    asset_id,
                    message: message.clone(),
                    retryable: classifier::categorize(message).is_retryable(),
                }
            }
        };

        self.events.emit(CoreEvent::Asset(event)).ok();
    }
}
