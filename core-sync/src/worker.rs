//! # Worker Loop
//!
//! Polls the job store for runnable work and drives it through the
//! orchestrator, one job at a time.
//!
//! A job is runnable when it is `pending`, or `running` without activity for
//! longer than the staleness threshold (its worker presumably died). Claims are
//! atomic, so competing workers never run the same job twice; a stale reclaim
//! keeps the original `started_at`.
//!
//! The loop never stops on errors. It exits only when its shutdown token is
//! cancelled, which is observed between jobs and during idle sleeps.

use crate::clients::TenantClientSource;
use crate::job::{SyncJob, SyncJobId, SyncStatus};
use crate::orchestrator::SyncOrchestrator;
use crate::repository::SyncJobRepository;
use crate::{Result, SyncError};
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Tunables for the poll loop
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_id: String,
    pub poll_interval: Duration,
    pub stale_after: Duration,
}

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing runnable
    Idle,
    /// Another worker claimed the job first or took it over mid-run
    Lost { job_id: SyncJobId },
    /// A job was run to a terminal status
    Finished {
        job_id: SyncJobId,
        status: SyncStatus,
    },
}

pub struct SyncWorker {
    jobs: Arc<dyn SyncJobRepository>,
    clients: TenantClientSource,
    orchestrator: Arc<SyncOrchestrator>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    settings: WorkerSettings,
}

impl SyncWorker {
    pub fn new(
        jobs: Arc<dyn SyncJobRepository>,
        clients: TenantClientSource,
        orchestrator: Arc<SyncOrchestrator>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            jobs,
            clients,
            orchestrator,
            clock,
            events,
            settings,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.settings.worker_id
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            worker_id = %self.settings.worker_id,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Sync worker started"
        );

        while !shutdown.is_cancelled() {
            let idle = match self.poll_once().await {
                Ok(PollOutcome::Finished { .. }) => false,
                Ok(PollOutcome::Idle) | Ok(PollOutcome::Lost { .. }) => true,
                Err(e) => {
                    error!(error = %e, "Sync worker poll failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                }
            }
        }

        info!(worker_id = %self.settings.worker_id, "Sync worker stopped");
    }

    /// Claim and run at most one job.
    ///
    /// # Errors
    ///
    /// Returns an error only when the job store cannot be queried or claimed;
    /// failures after a successful claim end up on the job record.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let now = self.clock.unix_timestamp();
        let stale_before = now - self.stale_after_secs();

        let Some(observed) = self.jobs.find_next_runnable(stale_before).await? else {
            debug!("No runnable sync jobs");
            return Ok(PollOutcome::Idle);
        };

        let reclaimed = observed.status == SyncStatus::Running;
        let claimed = if reclaimed {
            observed.clone().reclaim(&self.settings.worker_id, now)?
        } else {
            observed.clone().start(&self.settings.worker_id, now)?
        };

        if !self.jobs.try_claim(&observed, &claimed).await? {
            debug!(job_id = %observed.id, "Job claimed by another worker");
            return Ok(PollOutcome::Lost {
                job_id: observed.id,
            });
        }

        if reclaimed {
            warn!(
                job_id = %claimed.id,
                previous_worker = observed.claimed_by.as_deref().unwrap_or("unknown"),
                "Reclaimed stale sync job"
            );
        }
        self.events
            .emit(CoreEvent::Sync(SyncEvent::Started {
                job_id: claimed.id.to_string(),
                tenant_id: claimed.tenant_id.clone(),
                worker_id: self.settings.worker_id.clone(),
                reclaimed,
            }))
            .ok();

        Ok(self.process(claimed).await)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, tenant_id = %job.tenant_id))]
    async fn process(&self, job: SyncJob) -> PollOutcome {
        let job_id = job.id;

        let clients = match self.clients.clients(&job.tenant_id).await {
            Ok(clients) => clients,
            Err(e) => {
                warn!(error = %e, "Cannot run job without tenant clients");
                self.fail_job(job, &e.to_string()).await;
                return PollOutcome::Finished {
                    job_id,
                    status: SyncStatus::Failed,
                };
            }
        };

        match self.orchestrator.run(job, &clients).await {
            Ok(summary) => PollOutcome::Finished {
                job_id,
                status: summary.status,
            },
            Err(SyncError::ClaimLost { .. }) => PollOutcome::Lost { job_id },
            Err(e) => {
                // The orchestrator records its own failures; this covers the
                // case where that write did not land.
                self.fail_if_still_ours(&job_id, &e.to_string()).await;
                PollOutcome::Finished {
                    job_id,
                    status: SyncStatus::Failed,
                }
            }
        }
    }

    async fn fail_if_still_ours(&self, job_id: &SyncJobId, message: &str) {
        match self.jobs.find_by_id(job_id).await {
            Ok(Some(stored))
                if stored.status == SyncStatus::Running
                    && stored.claimed_by.as_deref() == Some(self.settings.worker_id.as_str()) =>
            {
                self.fail_job(stored, message).await;
            }
            Ok(_) => {}
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to reload job"),
        }
    }

    /// Persist `failed`; store errors are logged, never raised.
    async fn fail_job(&self, job: SyncJob, message: &str) {
        let expected = job.status;
        let failed = match job.fail(message, self.clock.unix_timestamp()) {
            Ok(failed) => failed,
            Err(e) => {
                warn!(error = %e, "Job cannot be marked failed");
                return;
            }
        };

        match self
            .jobs
            .update_if_owned(&failed, expected, failed.claimed_by.as_deref())
            .await
        {
            Ok(true) => {
                self.events
                    .emit(CoreEvent::Sync(SyncEvent::Failed {
                        job_id: failed.id.to_string(),
                        message: message.to_string(),
                        assets_processed: failed.stats.assets_processed,
                    }))
                    .ok();
            }
            Ok(false) => {
                debug!(job_id = %failed.id, "Job changed hands or status; failure not recorded")
            }
            Err(e) => error!(job_id = %failed.id, error = %e, "Failed to persist job failure"),
        }
    }

    fn stale_after_secs(&self) -> i64 {
        self.settings.stale_after.as_secs().min(i64::MAX as u64) as i64
    }
}
