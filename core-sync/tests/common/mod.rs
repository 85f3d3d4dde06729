//! Engine wiring for integration tests: in-memory SQLite plus fake
//! collaborators.
#![allow(dead_code)]

#[path = "../../src/test_support.rs"]
pub mod fakes;

use bridge_traits::time::{Clock, ManualClock};
use core_runtime::events::{CoreEvent, EventBus};
use core_sync::{
    create_test_pool, AssetSynchronizer, AssetUploader, OrchestratorSettings,
    PlaceholderTemplater, RateLimiter, RetryEngine, SqliteSyncJobRepository,
    SqliteSyncedAssetRepository, SyncJobRepository, SyncOrchestrator, SyncService, SyncWorker,
    TenantClientSource, WorkerSettings,
};
use fakes::{FakeDam, FakeDestination, StaticResolver, StaticTenantConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

pub const T0: i64 = 1_700_000_000;
pub const TENANT: &str = "acme";

pub struct Engine {
    pub jobs: Arc<SqliteSyncJobRepository>,
    pub assets: Arc<SqliteSyncedAssetRepository>,
    pub dam: Arc<FakeDam>,
    pub destination: Arc<FakeDestination>,
    pub tenants: Arc<StaticTenantConfig>,
    pub clock: Arc<ManualClock>,
    pub events: EventBus,
    pub limiter: Arc<RateLimiter>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub retry: Arc<RetryEngine>,
    pub service: SyncService,
    pub resolver: Arc<StaticResolver>,
    synchronizer: Arc<AssetSynchronizer>,
    client_source: TenantClientSource,
}

impl Engine {
    /// Engine for tenant `acme` tagged `tags`, with a zero retry backoff
    pub async fn new(tags: &[&str]) -> Self {
        Self::with_settings(
            tags,
            OrchestratorSettings {
                retry_backoff: Duration::ZERO,
                auto_retry_transient: true,
            },
        )
        .await
    }

    pub async fn with_settings(tags: &[&str], settings: OrchestratorSettings) -> Self {
        let pool = create_test_pool().await.unwrap();
        let jobs = Arc::new(SqliteSyncJobRepository::new(pool.clone()));
        let assets = Arc::new(SqliteSyncedAssetRepository::new(pool.clone()));
        let dam = Arc::new(FakeDam::new());
        let destination = Arc::new(FakeDestination::new());
        let tenants = Arc::new(StaticTenantConfig::new().with_tenant(TENANT, tags));
        let resolver = Arc::new(StaticResolver::new().with_clients(
            TENANT,
            dam.clone(),
            destination.clone(),
        ));
        let clock = Arc::new(ManualClock::at_timestamp(T0));
        let clock_dyn: Arc<dyn Clock> = clock.clone();
        let events = EventBus::new(256);
        let limiter = Arc::new(RateLimiter::new(1000.0, 1000));
        let client_source = TenantClientSource::new(resolver.clone(), Arc::clone(&limiter));

        let synchronizer = Arc::new(AssetSynchronizer::new(
            tenants.clone(),
            assets.clone(),
            AssetUploader::new(Arc::new(PlaceholderTemplater::new()), clock_dyn.clone()),
            clock_dyn.clone(),
            events.clone(),
        ));
        let retry = Arc::new(RetryEngine::new(
            jobs.clone(),
            Arc::clone(&synchronizer),
            client_source.clone(),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            jobs.clone(),
            tenants.clone(),
            Arc::clone(&synchronizer),
            Arc::clone(&retry),
            clock_dyn.clone(),
            events.clone(),
            settings,
        ));
        let service = SyncService::new(
            jobs.clone(),
            assets.clone(),
            Arc::clone(&synchronizer),
            Arc::clone(&retry),
            client_source.clone(),
            clock_dyn,
            events.clone(),
        );

        Self {
            jobs,
            assets,
            dam,
            destination,
            tenants,
            clock,
            events,
            limiter,
            orchestrator,
            retry,
            service,
            resolver,
            synchronizer,
            client_source,
        }
    }

    pub fn worker(&self, worker_id: &str) -> SyncWorker {
        self.worker_with_jobs(worker_id, self.jobs.clone())
    }

    /// Worker whose own job-store calls go through `jobs`; the orchestrator
    /// keeps using the engine's store.
    pub fn worker_with_jobs(
        &self,
        worker_id: &str,
        jobs: Arc<dyn SyncJobRepository>,
    ) -> SyncWorker {
        let clock: Arc<dyn Clock> = self.clock.clone();
        SyncWorker::new(
            jobs,
            self.client_source.clone(),
            Arc::clone(&self.orchestrator),
            clock,
            self.events.clone(),
            WorkerSettings {
                worker_id: worker_id.to_string(),
                poll_interval: Duration::from_millis(10),
                stale_after: Duration::from_secs(300),
            },
        )
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}

/// Everything currently buffered on `rx`
pub fn drain(rx: &mut Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
