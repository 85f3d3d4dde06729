//! # Sync Service
//!
//! Operations exposed to hosts: enqueue, cancel, retry, single-asset sync and
//! the job read model.

use crate::asset::{SyncOrigin, SyncedAsset};
use crate::asset_sync::{AssetSyncOutcome, AssetSynchronizer};
use crate::clients::TenantClientSource;
use crate::job::{SyncJob, SyncJobId, SyncStatus};
use crate::rate_limiter::RateLimitStats;
use crate::repository::{SyncJobRepository, SyncedAssetRepository};
use crate::retry::{RetryEngine, RetryReport, RetryTarget};
use crate::{Result, SyncError};
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Attempts at a status-guarded cancellation before giving up
const CANCEL_ATTEMPTS: usize = 3;

pub struct SyncService {
    jobs: Arc<dyn SyncJobRepository>,
    assets: Arc<dyn SyncedAssetRepository>,
    synchronizer: Arc<AssetSynchronizer>,
    retry: Arc<RetryEngine>,
    clients: TenantClientSource,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl SyncService {
    pub fn new(
        jobs: Arc<dyn SyncJobRepository>,
        assets: Arc<dyn SyncedAssetRepository>,
        synchronizer: Arc<AssetSynchronizer>,
        retry: Arc<RetryEngine>,
        clients: TenantClientSource,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            jobs,
            assets,
            synchronizer,
            retry,
            clients,
            clock,
            events,
        }
    }

    /// Enqueue a sync for `tenant_id`; a worker picks it up on its next poll.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a blank tenant id, or a store error
    #[instrument(skip(self))]
    pub async fn create_pending_job(&self, tenant_id: &str) -> Result<SyncJobId> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(SyncError::InvalidInput("Tenant id cannot be empty".to_string()));
        }

        let job = SyncJob::new(tenant_id, self.clock.unix_timestamp());
        self.jobs.insert(&job).await?;

        info!(job_id = %job.id, "Sync job queued");
        self.events
            .emit(CoreEvent::Sync(SyncEvent::Queued {
                job_id: job.id.to_string(),
                tenant_id: job.tenant_id.clone(),
            }))
            .ok();

        Ok(job.id)
    }

    /// Cancel a pending or running job.
    ///
    /// A running job stops at its next asset boundary; an upload already in
    /// flight completes.
    ///
    /// # Errors
    ///
    /// Returns `JobNotFound`, or `InvalidStateTransition` if the job already
    /// finished
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn request_cancellation(&self, job_id: &SyncJobId) -> Result<SyncJob> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let job = self.get_job(job_id).await?;
            let expected = job.status;
            let cancelled = job.cancel(self.clock.unix_timestamp())?;

            if self.jobs.update_if_status(&cancelled, expected).await? {
                info!(previous_status = %expected, "Sync job cancellation requested");
                if expected == SyncStatus::Pending {
                    // No worker will observe it
                    self.events
                        .emit(CoreEvent::Sync(SyncEvent::Cancelled {
                            job_id: cancelled.id.to_string(),
                            assets_processed: 0,
                        }))
                        .ok();
                }
                return Ok(cancelled);
            }

            debug!(attempt, "Job status changed during cancellation");
            if attempt >= CANCEL_ATTEMPTS {
                return Err(SyncError::InvalidStateTransition {
                    from: expected.as_str().to_string(),
                    to: SyncStatus::Cancelled.as_str().to_string(),
                    reason: "Job status kept changing".to_string(),
                });
            }
        }
    }

    /// Re-run failed assets. Never fails; see [`RetryReport::error`].
    pub async fn retry(&self, target: RetryTarget, only_transient: bool) -> RetryReport {
        self.retry.retry(target, only_transient).await
    }

    /// # Errors
    ///
    /// Returns `JobNotFound` if no such job exists
    pub async fn get_job(&self, job_id: &SyncJobId) -> Result<SyncJob> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| SyncError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Most recent jobs for a tenant
    pub async fn list_jobs(&self, tenant_id: &str, limit: u32) -> Result<Vec<SyncJob>> {
        self.jobs.list_by_tenant(tenant_id, limit).await
    }

    /// Imported assets for a tenant
    pub async fn list_synced_assets(&self, tenant_id: &str) -> Result<Vec<SyncedAsset>> {
        self.assets.list_by_tenant(tenant_id).await
    }

    /// Sync one asset outside of any job (webhook or manual trigger).
    ///
    /// # Errors
    ///
    /// Returns `TenantNotConfigured` when the tenant has no clients; asset
    /// level failures are reported in the outcome
    #[instrument(skip(self))]
    pub async fn sync_single_asset(
        &self,
        tenant_id: &str,
        asset_id: &str,
        origin: SyncOrigin,
    ) -> Result<AssetSyncOutcome> {
        let clients = self.clients.clients(tenant_id).await?;
        Ok(self
            .synchronizer
            .sync_asset(&clients, tenant_id, asset_id, origin, None)
            .await)
    }

    pub async fn rate_limit_stats(&self) -> RateLimitStats {
        self.clients.limiter().stats().await
    }

    pub async fn reset_rate_limit_hits(&self) {
        self.clients.limiter().reset_hits().await;
    }

    /// Lifecycle and per-asset events
    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
