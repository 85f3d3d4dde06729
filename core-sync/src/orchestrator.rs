//! # Sync Orchestrator
//!
//! Drives one claimed job from discovery to a terminal status.
//!
//! ## Workflow
//!
//! 1. Load the tenant's tags; none means a zero-work completion.
//! 2. List each tag from the DAM and union the results into a de-duplicated
//!    candidate list, in listing order.
//! 3. For each candidate, check for external cancellation first, then run a
//!    single-asset sync and record progress (which also refreshes the job's
//!    heartbeat).
//! 4. Re-check cancellation once the loop is done.
//! 5. If any failures are transient, wait the retry backoff and re-run those
//!    assets once, merging successes back into the counters. The heartbeat is
//!    refreshed after the wait and after every re-run asset.
//! 6. Persist `completed` (residual errors allowed).
//!
//! A reclaimed job resumes from the counters and errors its previous holder
//! recorded: the first `assets_processed` candidates are re-run but not
//! counted again. Every terminal write is conditional on this worker still
//! holding the claim.
//!
//! A batch-level failure (listing, configuration or store errors) persists
//! `failed` with the message and is returned to the caller.

use crate::asset::SyncOrigin;
use crate::asset_sync::{AssetSyncOutcome, AssetSynchronizer};
use crate::classifier;
use crate::job::{AssetError, SyncJob, SyncJobId, SyncJobStats, SyncStatus};
use crate::repository::SyncJobRepository;
use crate::retry::{RetryEngine, RetryReport};
use crate::{Result, SyncError};
use bridge_traits::dam::DamAssetSummary;
use bridge_traits::tenant::{TenantClients, TenantConfigProvider};
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Tunables for a job run
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// Wait before the automatic transient retry pass
    pub retry_backoff: Duration,
    /// Whether the automatic transient retry pass runs at all
    pub auto_retry_transient: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            retry_backoff: core_runtime::config::DEFAULT_RETRY_BACKOFF,
            auto_retry_transient: true,
        }
    }
}

/// Final state of a job run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub job_id: SyncJobId,
    pub status: SyncStatus,
    pub stats: SyncJobStats,
    pub errors: Vec<AssetError>,
    /// Number of assets re-run by the automatic retry pass
    pub retried: u64,
}

/// Counters accumulated while walking the candidates
#[derive(Debug)]
struct RunState {
    stats: SyncJobStats,
    errors: Vec<AssetError>,
    retried: u64,
}

impl RunState {
    /// Start from what the job already recorded; a reclaimed job carries the
    /// previous holder's progress.
    fn resume(job: &SyncJob) -> Self {
        Self {
            stats: job.stats,
            errors: job.errors.clone(),
            retried: 0,
        }
    }

    fn record_failure(&mut self, asset_id: &str, message: String) {
        match self.errors.iter_mut().find(|e| e.asset_id == asset_id) {
            Some(existing) => existing.message = message,
            None => self.errors.push(AssetError::new(asset_id, message)),
        }
    }

    fn clear_failure(&mut self, asset_id: &str) {
        self.errors.retain(|e| e.asset_id != asset_id);
    }

    fn merge_retry(&mut self, report: &RetryReport) {
        self.retried += report.processed;
        self.stats.assets_created += report.created;
        self.stats.assets_updated += report.updated;
        self.errors
            .retain(|e| !report.resolved_asset_ids.contains(&e.asset_id));
        for error in self.errors.iter_mut() {
            if let Some(latest) = report
                .remaining_errors
                .iter()
                .find(|r| r.asset_id == error.asset_id)
            {
                error.message = latest.original_message.clone();
            }
        }
    }
}

pub struct SyncOrchestrator {
    jobs: Arc<dyn SyncJobRepository>,
    tenant_config: Arc<dyn TenantConfigProvider>,
    synchronizer: Arc<AssetSynchronizer>,
    retry: Arc<RetryEngine>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    settings: OrchestratorSettings,
}

impl SyncOrchestrator {
    pub fn new(
        jobs: Arc<dyn SyncJobRepository>,
        tenant_config: Arc<dyn TenantConfigProvider>,
        synchronizer: Arc<AssetSynchronizer>,
        retry: Arc<RetryEngine>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            jobs,
            tenant_config,
            synchronizer,
            retry,
            clock,
            events,
            settings,
        }
    }

    /// Run a job the caller has already claimed (`running`, `claimed_by` set).
    ///
    /// `clients.dam` is expected to be rate limited by the caller.
    ///
    /// # Errors
    ///
    /// Returns the batch-level failure after persisting `failed`, or
    /// `ClaimLost` (without persisting anything) when another worker took the
    /// job over mid-run.
    #[instrument(skip(self, job, clients), fields(job_id = %job.id, tenant_id = %job.tenant_id))]
    pub async fn run(&self, job: SyncJob, clients: &TenantClients) -> Result<SyncSummary> {
        let mut job = job;
        let mut state = RunState::resume(&job);

        match self.execute(&mut job, &mut state, clients).await {
            Ok(summary) => Ok(summary),
            Err(e @ SyncError::ClaimLost { .. }) => {
                warn!(error = %e, "Abandoning job");
                Err(e)
            }
            Err(e) => {
                error!(error = %e, "Sync job failed");
                self.persist_failure(&job, &state, &e).await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        job: &mut SyncJob,
        state: &mut RunState,
        clients: &TenantClients,
    ) -> Result<SyncSummary> {
        let tags = match self.tenant_config.settings(&job.tenant_id).await? {
            Some(settings) if settings.has_tags() => settings.sync_tags,
            _ => {
                info!("No sync tags configured; nothing to do");
                return self.finish(job, state).await;
            }
        };

        let candidates = self.discover(clients, &tags).await?;
        info!(candidates = candidates.len(), tags = ?tags, "Discovered candidate assets");

        // Candidates before this index were counted by a previous holder
        let resume_from = job.stats.assets_processed;
        if resume_from > 0 {
            info!(resume_from, "Resuming reclaimed job");
        }

        for (index, candidate) in candidates.iter().enumerate() {
            if self.check_cancelled(job).await? {
                return self.finish_cancelled(job, state).await;
            }

            let outcome = self
                .synchronizer
                .sync_asset(
                    clients,
                    &job.tenant_id,
                    &candidate.id,
                    SyncOrigin::Auto,
                    Some(&job.id),
                )
                .await;

            if index as u64 >= resume_from {
                state.stats.assets_processed += 1;
            }
            match outcome {
                AssetSyncOutcome::Created { .. } => {
                    state.stats.assets_created += 1;
                    state.clear_failure(&candidate.id);
                }
                AssetSyncOutcome::Updated { .. } => {
                    state.stats.assets_updated += 1;
                    state.clear_failure(&candidate.id);
                }
                AssetSyncOutcome::Skipped { reason } => {
                    debug!(asset_id = %candidate.id, reason = reason.as_str(), "Asset skipped");
                    state.clear_failure(&candidate.id);
                }
                AssetSyncOutcome::Failed { message } => {
                    state.record_failure(&candidate.id, message);
                }
            }

            self.record_progress(job, state).await?;
        }

        if self.check_cancelled(job).await? {
            return self.finish_cancelled(job, state).await;
        }

        if self.retry_transient(job, state, clients).await? {
            return self.finish_cancelled(job, state).await;
        }
        self.finish(job, state).await
    }

    /// Union of all tag listings, first occurrence wins
    async fn discover(
        &self,
        clients: &TenantClients,
        tags: &[String],
    ) -> Result<Vec<DamAssetSummary>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for tag in tags {
            let listed = clients.dam.list_assets_by_tag(tag).await?;
            debug!(tag = %tag, count = listed.len(), "Listed assets for tag");
            for asset in listed {
                if seen.insert(asset.id.clone()) {
                    candidates.push(asset);
                }
            }
        }

        Ok(candidates)
    }

    /// Whether the stored job was cancelled. Fails with `ClaimLost` if the job
    /// is no longer running under this worker.
    async fn check_cancelled(&self, job: &SyncJob) -> Result<bool> {
        let stored = self
            .jobs
            .find_by_id(&job.id)
            .await?
            .ok_or_else(|| SyncError::JobNotFound {
                job_id: job.id.to_string(),
            })?;

        match stored.status {
            SyncStatus::Cancelled => Ok(true),
            SyncStatus::Running if stored.claimed_by == job.claimed_by => Ok(false),
            _ => Err(self.claim_lost(job)),
        }
    }

    async fn record_progress(&self, job: &mut SyncJob, state: &RunState) -> Result<()> {
        job.record_progress(
            state.stats,
            state.errors.clone(),
            self.clock.unix_timestamp(),
        )?;

        if !self.jobs.record_progress(job).await? {
            // Cancelled or taken over; the next boundary check decides which
            debug!("Progress write not applied");
        }
        Ok(())
    }

    /// Refresh the heartbeat outside the candidate loop. Returns whether the
    /// job was cancelled meanwhile; fails with `ClaimLost` if it was taken over.
    async fn heartbeat(&self, job: &mut SyncJob, state: &RunState) -> Result<bool> {
        job.record_progress(
            state.stats,
            state.errors.clone(),
            self.clock.unix_timestamp(),
        )?;

        if self.jobs.record_progress(job).await? {
            return Ok(false);
        }
        self.check_cancelled(job).await
    }

    /// One automatic pass over the transient failures. Returns whether the job
    /// was cancelled during the pass.
    async fn retry_transient(
        &self,
        job: &mut SyncJob,
        state: &mut RunState,
        clients: &TenantClients,
    ) -> Result<bool> {
        if !self.settings.auto_retry_transient || state.errors.is_empty() {
            return Ok(false);
        }

        let batch = classifier::classify_batch(&state.errors);
        debug!(
            transient = batch.transient_count(),
            permanent = batch.permanent_count(),
            unknown = batch.unknown_count(),
            "Classified asset failures"
        );
        if !batch.has_transient() {
            return Ok(false);
        }

        let backoff = self.settings.retry_backoff;
        info!(
            transient = batch.transient_count(),
            backoff_ms = backoff.as_millis() as u64,
            "Retrying transient failures"
        );
        self.events
            .emit(CoreEvent::Sync(SyncEvent::RetryScheduled {
                job_id: job.id.to_string(),
                transient_count: batch.transient_count() as u64,
                backoff_ms: backoff.as_millis() as u64,
            }))
            .ok();
        tokio::time::sleep(backoff).await;

        if self.heartbeat(job, state).await? {
            return Ok(true);
        }

        for error in batch.transient.iter().map(|e| e.to_asset_error()) {
            let report = self
                .retry
                .retry_errors(
                    clients,
                    &job.tenant_id,
                    std::slice::from_ref(&error),
                    true,
                    SyncOrigin::Auto,
                    Some(&job.id),
                )
                .await;
            state.merge_retry(&report);

            if self.heartbeat(job, state).await? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn finish(&self, job: &SyncJob, state: &RunState) -> Result<SyncSummary> {
        let completed = job.clone().complete(
            state.stats,
            state.errors.clone(),
            self.clock.unix_timestamp(),
        )?;

        if !self
            .jobs
            .update_if_owned(&completed, SyncStatus::Running, job.claimed_by.as_deref())
            .await?
        {
            // A cancellation landed after the last boundary check
            if self.check_cancelled(job).await? {
                return self.finish_cancelled(job, state).await;
            }
            return Err(self.claim_lost(job));
        }

        info!(
            processed = completed.stats.assets_processed,
            created = completed.stats.assets_created,
            updated = completed.stats.assets_updated,
            errors = completed.errors.len(),
            "Sync job completed"
        );
        self.events
            .emit(CoreEvent::Sync(SyncEvent::Completed {
                job_id: completed.id.to_string(),
                assets_processed: completed.stats.assets_processed,
                assets_created: completed.stats.assets_created,
                assets_updated: completed.stats.assets_updated,
                error_count: completed.errors.len() as u64,
                duration_secs: completed.duration_secs().unwrap_or(0),
            }))
            .ok();

        Ok(SyncSummary {
            job_id: completed.id,
            status: completed.status,
            stats: completed.stats,
            errors: completed.errors,
            retried: state.retried,
        })
    }

    /// Attach partial counts to the externally cancelled record, keeping the
    /// cancellation's `completed_at`.
    async fn finish_cancelled(&self, job: &SyncJob, state: &RunState) -> Result<SyncSummary> {
        let stored = self
            .jobs
            .find_by_id(&job.id)
            .await?
            .ok_or_else(|| SyncError::JobNotFound {
                job_id: job.id.to_string(),
            })?;

        if stored.claimed_by != job.claimed_by {
            return Err(self.claim_lost(job));
        }

        let cancelled = stored.with_partial_progress(state.stats, state.errors.clone())?;
        if !self
            .jobs
            .update_if_owned(&cancelled, SyncStatus::Cancelled, job.claimed_by.as_deref())
            .await?
        {
            return Err(self.claim_lost(job));
        }

        info!(
            processed = cancelled.stats.assets_processed,
            "Sync job cancelled"
        );
        self.events
            .emit(CoreEvent::Sync(SyncEvent::Cancelled {
                job_id: cancelled.id.to_string(),
                assets_processed: cancelled.stats.assets_processed,
            }))
            .ok();

        Ok(SyncSummary {
            job_id: cancelled.id,
            status: cancelled.status,
            stats: cancelled.stats,
            errors: cancelled.errors,
            retried: state.retried,
        })
    }

    /// Best-effort `failed` write; a cancelled or foreign job is left alone.
    async fn persist_failure(&self, job: &SyncJob, state: &RunState, cause: &SyncError) {
        let message = cause.to_string();
        let mut failed = match job.clone().fail(&message, self.clock.unix_timestamp()) {
            Ok(failed) => failed,
            Err(e) => {
                warn!(error = %e, "Job cannot be marked failed");
                return;
            }
        };
        if state.stats.assets_processed >= failed.stats.assets_processed {
            failed.stats = state.stats;
            failed.errors = state.errors.clone();
        }

        match self
            .jobs
            .update_if_owned(&failed, SyncStatus::Running, job.claimed_by.as_deref())
            .await
        {
            Ok(true) => {
                self.events
                    .emit(CoreEvent::Sync(SyncEvent::Failed {
                        job_id: failed.id.to_string(),
                        message,
                        assets_processed: failed.stats.assets_processed,
                    }))
                    .ok();
            }
            Ok(false) => warn!("Job changed hands or status; failure not recorded"),
            Err(e) => error!(error = %e, "Failed to persist job failure"),
        }
    }

    fn claim_lost(&self, job: &SyncJob) -> SyncError {
        SyncError::ClaimLost {
            job_id: job.id.to_string(),
            worker_id: job.claimed_by.clone().unwrap_or_default(),
        }
    }
}
