//! # Retry Engine
//!
//! Re-runs single-asset syncs for a subset of failed assets.
//!
//! ## Overview
//!
//! Candidates come either from a finished job's stored error list or from an
//! explicit list of asset ids (which get a placeholder error so they classify
//! as transient). All candidates are classified; with `only_transient` only the
//! transient ones are re-run. Outcomes are collected into a [`RetryReport`].
//!
//! The engine never fails: lookup and resolution problems are reported on the
//! report itself.
//!
//! A manual retry by job id folds its successes back into the stored job
//! (counters up, resolved assets out of the error list). The automatic pass
//! run by the orchestrator uses [`RetryEngine::retry_errors`] directly and
//! merges the result itself.

use crate::asset::SyncOrigin;
use crate::asset_sync::{AssetSyncOutcome, AssetSynchronizer};
use crate::classifier::{self, CategorizedError};
use crate::clients::TenantClientSource;
use crate::job::{AssetError, SyncJob, SyncJobId, SyncStatus};
use crate::repository::SyncJobRepository;
use crate::{Result, SyncError};
use bridge_traits::tenant::TenantClients;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Message attached to explicitly requested assets
pub const MANUAL_RETRY_MESSAGE: &str = "Manual retry requested";

/// What to retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum RetryTarget {
    /// Replay the stored errors of a finished job
    Job { job_id: SyncJobId },
    /// Retry specific assets of a tenant
    Assets {
        tenant_id: String,
        asset_ids: Vec<String>,
    },
}

/// Outcome of a retry run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryReport {
    /// Candidates that were re-run
    pub processed: u64,
    /// Re-runs that did not fail (created, updated or skipped)
    pub successful: u64,
    /// Re-runs that failed again
    pub failed: u64,
    /// Candidates left alone because they were not retry-eligible
    pub skipped: u64,
    pub created: u64,
    pub updated: u64,
    /// Asset ids whose failure is resolved
    pub resolved_asset_ids: Vec<String>,
    /// Failures still outstanding, with their current classification
    pub remaining_errors: Vec<CategorizedError>,
    /// Why the run could not start, if it could not
    pub error: Option<String>,
}

impl RetryReport {
    fn aborted(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Remaining failures as plain asset errors, in candidate order
    pub fn remaining_asset_errors(&self) -> Vec<AssetError> {
        self.remaining_errors
            .iter()
            .map(CategorizedError::to_asset_error)
            .collect()
    }
}

pub struct RetryEngine {
    jobs: Arc<dyn SyncJobRepository>,
    synchronizer: Arc<AssetSynchronizer>,
    clients: TenantClientSource,
}

impl RetryEngine {
    pub fn new(
        jobs: Arc<dyn SyncJobRepository>,
        synchronizer: Arc<AssetSynchronizer>,
        clients: TenantClientSource,
    ) -> Self {
        Self {
            jobs,
            synchronizer,
            clients,
        }
    }

    /// Run a manual retry. Never fails.
    #[instrument(skip(self))]
    pub async fn retry(&self, target: RetryTarget, only_transient: bool) -> RetryReport {
        match self.try_retry(target, only_transient).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Retry aborted");
                RetryReport::aborted(e.to_string())
            }
        }
    }

    async fn try_retry(&self, target: RetryTarget, only_transient: bool) -> Result<RetryReport> {
        match target {
            RetryTarget::Assets {
                tenant_id,
                asset_ids,
            } => {
                let mut seen = HashSet::new();
                let candidates: Vec<AssetError> = asset_ids
                    .into_iter()
                    .filter(|id| !id.is_empty() && seen.insert(id.clone()))
                    .map(|id| AssetError::new(id, MANUAL_RETRY_MESSAGE))
                    .collect();
                if candidates.is_empty() {
                    return Ok(RetryReport::default());
                }

                let clients = self.clients.clients(&tenant_id).await?;
                Ok(self
                    .retry_errors(
                        &clients,
                        &tenant_id,
                        &candidates,
                        only_transient,
                        SyncOrigin::Manual,
                        None,
                    )
                    .await)
            }
            RetryTarget::Job { job_id } => {
                let job = self
                    .jobs
                    .find_by_id(&job_id)
                    .await?
                    .ok_or_else(|| SyncError::JobNotFound {
                        job_id: job_id.to_string(),
                    })?;

                if !job.status.is_terminal() {
                    return Err(SyncError::InvalidStateTransition {
                        from: job.status.as_str().to_string(),
                        to: "retry".to_string(),
                        reason: "Job is still active".to_string(),
                    });
                }
                if job.errors.is_empty() {
                    return Ok(RetryReport::default());
                }

                let clients = self.clients.clients(&job.tenant_id).await?;
                let report = self
                    .retry_errors(
                        &clients,
                        &job.tenant_id,
                        &job.errors,
                        only_transient,
                        SyncOrigin::Manual,
                        Some(&job.id),
                    )
                    .await;

                if report.successful > 0 {
                    self.fold_into_job(job.status, job, &report).await?;
                }
                Ok(report)
            }
        }
    }

    /// Re-run `errors` for a tenant with already-resolved clients. Never fails.
    pub async fn retry_errors(
        &self,
        clients: &TenantClients,
        tenant_id: &str,
        errors: &[AssetError],
        only_transient: bool,
        origin: SyncOrigin,
        job_id: Option<&SyncJobId>,
    ) -> RetryReport {
        let mut report = RetryReport::default();

        for error in errors {
            let classified = classifier::classify(&error.asset_id, &error.message);
            if only_transient && !classified.retryable {
                report.skipped += 1;
                report.remaining_errors.push(classified);
                continue;
            }

            report.processed += 1;
            let outcome = self
                .synchronizer
                .sync_asset(clients, tenant_id, &error.asset_id, origin, job_id)
                .await;

            match outcome {
                AssetSyncOutcome::Failed { message } => {
                    report.failed += 1;
                    report
                        .remaining_errors
                        .push(classifier::classify(&error.asset_id, &message));
                }
                other => {
                    report.successful += 1;
                    match other {
                        AssetSyncOutcome::Created { .. } => report.created += 1,
                        AssetSyncOutcome::Updated { .. } => report.updated += 1,
                        _ => {}
                    }
                    report.resolved_asset_ids.push(error.asset_id.clone());
                }
            }
        }

        info!(
            tenant_id = %tenant_id,
            processed = report.processed,
            successful = report.successful,
            failed = report.failed,
            skipped = report.skipped,
            "Retry pass finished"
        );

        report
    }

    async fn fold_into_job(
        &self,
        expected: SyncStatus,
        mut job: SyncJob,
        report: &RetryReport,
    ) -> Result<()> {
        let resolved: HashSet<&String> = report.resolved_asset_ids.iter().collect();
        job.apply_retry(report.created, report.updated, &report.resolved_asset_ids)?;

        // Keep the latest message for assets that failed again
        for error in job.errors.iter_mut() {
            if resolved.contains(&error.asset_id) {
                continue;
            }
            if let Some(latest) = report
                .remaining_errors
                .iter()
                .find(|r| r.asset_id == error.asset_id)
            {
                error.message = latest.original_message.clone();
            }
        }

        if !self.jobs.update_if_status(&job, expected).await? {
            warn!(job_id = %job.id, "Job changed during retry; results not merged");
        }
        Ok(())
    }
}
