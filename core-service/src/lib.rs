//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided collaborators (tenant settings, DAM and
//! destination clients, clock) into the sync engine. Hosts build a
//! [`SyncEngineConfig`], call [`SyncEngine::bootstrap`], then start the
//! background worker and drive jobs through [`SyncEngine::service`].
//!
//! ```ignore
//! use core_service::{SyncEngine, SyncEngineConfig};
//!
//! let config = SyncEngineConfig::builder()
//!     .database_path("/var/lib/dam-sync/jobs.db")
//!     .tenant_config(tenants)
//!     .client_resolver(resolver)
//!     .build()?;
//!
//! let engine = SyncEngine::bootstrap(config).await?;
//! let worker = engine.start_worker();
//!
//! engine.service().create_pending_job("acme").await?;
//! // ...
//! worker.shutdown().await?;
//! ```

pub mod error;

pub use core_runtime::config::{SyncEngineConfig, SyncEngineConfigBuilder};
pub use core_runtime::events::{AssetEvent, CoreEvent, EventBus, SyncEvent};
pub use core_sync::{
    AssetSyncOutcome, RateLimitStats, RetryReport, RetryTarget, SyncJob, SyncJobId, SyncOrigin,
    SyncService, SyncStatus, SyncedAsset,
};
pub use error::{CoreError, Result};

use bridge_traits::AssetPathTemplater;
use core_sync::{
    create_pool, AssetSynchronizer, AssetUploader, DatabaseConfig, OrchestratorSettings,
    PlaceholderTemplater, RateLimiter, RetryEngine, SqliteSyncJobRepository,
    SqliteSyncedAssetRepository, SyncOrchestrator, SyncWorker, TenantClientSource, WorkerSettings,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Primary façade exposed to host applications.
pub struct SyncEngine {
    service: Arc<SyncService>,
    worker: Arc<SyncWorker>,
    pool: SqlitePool,
    events: EventBus,
}

impl SyncEngine {
    /// Validate `config`, open the job database and wire every component.
    ///
    /// # Errors
    ///
    /// Returns `InitializationFailed` for an invalid configuration, or a sync
    /// error if the database cannot be opened or migrated
    pub async fn bootstrap(config: SyncEngineConfig) -> Result<Self> {
        config.validate()?;

        let database = match &config.database_path {
            Some(path) => DatabaseConfig::new(path.clone()),
            None => DatabaseConfig::in_memory(),
        };
        let pool = create_pool(database).await?;

        let jobs = Arc::new(SqliteSyncJobRepository::new(pool.clone()));
        let assets = Arc::new(SqliteSyncedAssetRepository::new(pool.clone()));
        let events = EventBus::new(config.event_buffer_size);

        let limiter = Arc::new(RateLimiter::new(
            config.requests_per_second,
            config.burst_capacity,
        ));
        let clients = TenantClientSource::new(config.client_resolver.clone(), limiter);

        let templater: Arc<dyn AssetPathTemplater> = match &config.path_templater {
            Some(templater) => templater.clone(),
            None => Arc::new(PlaceholderTemplater::new()),
        };
        let synchronizer = Arc::new(AssetSynchronizer::new(
            config.tenant_config.clone(),
            assets.clone(),
            AssetUploader::new(templater, config.clock.clone()),
            config.clock.clone(),
            events.clone(),
        ));
        let retry = Arc::new(RetryEngine::new(
            jobs.clone(),
            Arc::clone(&synchronizer),
            clients.clone(),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            jobs.clone(),
            config.tenant_config.clone(),
            Arc::clone(&synchronizer),
            Arc::clone(&retry),
            config.clock.clone(),
            events.clone(),
            OrchestratorSettings {
                retry_backoff: config.retry_backoff,
                auto_retry_transient: config.auto_retry_transient,
            },
        ));
        let worker = Arc::new(SyncWorker::new(
            jobs.clone(),
            clients.clone(),
            orchestrator,
            config.clock.clone(),
            events.clone(),
            WorkerSettings {
                worker_id: config.worker_id.clone(),
                poll_interval: config.poll_interval,
                stale_after: config.stale_after,
            },
        ));
        let service = Arc::new(SyncService::new(
            jobs,
            assets,
            synchronizer,
            retry,
            clients,
            config.clock.clone(),
            events.clone(),
        ));

        info!(
            worker_id = %config.worker_id,
            in_memory = config.database_path.is_none(),
            requests_per_second = config.requests_per_second,
            burst_capacity = config.burst_capacity,
            "Sync engine initialized"
        );

        Ok(Self {
            service,
            worker,
            pool,
            events,
        })
    }

    /// Host-facing job operations
    pub fn service(&self) -> Arc<SyncService> {
        Arc::clone(&self.service)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn worker_id(&self) -> &str {
        self.worker.worker_id()
    }

    /// Spawn the poll loop on the current Tokio runtime.
    pub fn start_worker(&self) -> WorkerHandle {
        let shutdown = CancellationToken::new();
        let worker = Arc::clone(&self.worker);
        let token = shutdown.clone();
        let task = tokio::spawn(async move { worker.run(token).await });

        WorkerHandle { shutdown, task }
    }

    /// # Errors
    ///
    /// Returns a sync error if the job database does not answer
    pub async fn health_check(&self) -> Result<()> {
        core_sync::db::health_check(&self.pool).await?;
        Ok(())
    }

    /// Close the database pool. Stop any running worker first.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Running worker task
pub struct WorkerHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Token that stops the worker when cancelled; a job in progress finishes first.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait for the loop to exit.
    ///
    /// # Errors
    ///
    /// Returns `Worker` if the worker task panicked
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        self.task
            .await
            .map_err(|e| CoreError::Worker(e.to_string()))
    }
}
