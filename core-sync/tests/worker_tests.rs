//! Worker behaviour when the job store misbehaves.

mod common;

use async_trait::async_trait;
use common::fakes::metadata;
use common::{Engine, TENANT};
use core_sync::{
    PollOutcome, Result, SqliteSyncJobRepository, SyncError, SyncJob, SyncJobId,
    SyncJobRepository, SyncStatus,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Job store that can be told to reject lookups or terminal writes
struct FlakyJobs {
    inner: Arc<SqliteSyncJobRepository>,
    fail_lookups: AtomicBool,
    fail_writes: AtomicBool,
    lookups: AtomicUsize,
}

impl FlakyJobs {
    fn new(inner: Arc<SqliteSyncJobRepository>) -> Self {
        Self {
            inner,
            fail_lookups: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            lookups: AtomicUsize::new(0),
        }
    }

    fn outage() -> SyncError {
        SyncError::Database("database is locked".to_string())
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        Ok(())
    }
}

#[async_trait]
impl SyncJobRepository for FlakyJobs {
    async fn insert(&self, job: &SyncJob) -> Result<()> {
        self.inner.insert(job).await
    }

    async fn update(&self, job: &SyncJob) -> Result<()> {
        self.check_writes()?;
        self.inner.update(job).await
    }

    async fn update_if_status(&self, job: &SyncJob, expected: SyncStatus) -> Result<bool> {
        self.check_writes()?;
        self.inner.update_if_status(job, expected).await
    }

    async fn update_if_owned(
        &self,
        job: &SyncJob,
        expected: SyncStatus,
        owner: Option<&str>,
    ) -> Result<bool> {
        self.check_writes()?;
        self.inner.update_if_owned(job, expected, owner).await
    }

    async fn find_by_id(&self, id: &SyncJobId) -> Result<Option<SyncJob>> {
        self.inner.find_by_id(id).await
    }

    async fn find_next_runnable(&self, stale_before: i64) -> Result<Option<SyncJob>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.find_next_runnable(stale_before).await
    }

    async fn try_claim(&self, observed: &SyncJob, claimed: &SyncJob) -> Result<bool> {
        self.inner.try_claim(observed, claimed).await
    }

    async fn record_progress(&self, job: &SyncJob) -> Result<bool> {
        self.check_writes()?;
        self.inner.record_progress(job).await
    }

    async fn list_by_tenant(&self, tenant_id: &str, limit: u32) -> Result<Vec<SyncJob>> {
        self.inner.list_by_tenant(tenant_id, limit).await
    }
}

#[tokio::test]
async fn test_lookup_failure_is_returned_from_poll() {
    let engine = Engine::new(&["promo"]).await;
    let jobs = Arc::new(FlakyJobs::new(engine.jobs.clone()));
    jobs.fail_lookups.store(true, Ordering::SeqCst);
    let worker = engine.worker_with_jobs("worker-a", jobs.clone());

    let result = worker.poll_once().await;
    assert!(matches!(result, Err(SyncError::Database(_))));
}

#[tokio::test]
async fn test_unwritable_failure_is_logged_not_raised() {
    let engine = Engine::new(&["promo"]).await;
    let job_id = engine.service.create_pending_job("globex").await.unwrap();
    let jobs = Arc::new(FlakyJobs::new(engine.jobs.clone()));
    jobs.fail_writes.store(true, Ordering::SeqCst);
    let worker = engine.worker_with_jobs("worker-a", jobs.clone());

    let outcome = worker.poll_once().await.unwrap();
    assert_eq!(
        outcome,
        PollOutcome::Finished {
            job_id,
            status: SyncStatus::Failed
        }
    );

    // The claim landed but the failure write did not
    let job = engine.service.get_job(&job_id).await.unwrap();
    assert_eq!(job.status, SyncStatus::Running);
    assert_eq!(job.claimed_by.as_deref(), Some("worker-a"));
    assert!(job.fatal_error.is_none());

    // Still held with a fresh heartbeat, so nobody picks it up again
    assert_eq!(worker.poll_once().await.unwrap(), PollOutcome::Idle);
}

#[tokio::test]
async fn test_worker_loop_outlives_store_outage() {
    let engine = Engine::new(&["promo"]).await;
    engine.dam.put_asset(metadata("a1", &["promo"], 1));
    let jobs = Arc::new(FlakyJobs::new(engine.jobs.clone()));
    jobs.fail_lookups.store(true, Ordering::SeqCst);
    let worker = engine.worker_with_jobs("worker-a", jobs.clone());

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    for _ in 0..200 {
        if jobs.lookups.load(Ordering::SeqCst) >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(jobs.lookups.load(Ordering::SeqCst) >= 3);
    assert!(!handle.is_finished());

    // Once the store answers again the loop picks work up
    jobs.fail_lookups.store(false, Ordering::SeqCst);
    let job_id = engine.service.create_pending_job(TENANT).await.unwrap();
    let mut job = engine.service.get_job(&job_id).await.unwrap();
    for _ in 0..200 {
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        job = engine.service.get_job(&job_id).await.unwrap();
    }
    assert_eq!(job.status, SyncStatus::Completed);
    assert_eq!(job.stats.assets_created, 1);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}
