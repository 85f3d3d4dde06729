//! # Asset Sync Engine
//!
//! Imports tagged assets from a digital-asset-management (DAM) system into a
//! destination content store, as background jobs.
//!
//! ## Overview
//!
//! A job discovers every DAM asset carrying one of the tenant's sync tags,
//! uploads the ones whose DAM version is newer than the last import, and
//! records the result. Jobs survive restarts: a worker that dies mid-run leaves
//! its job `running`, and another worker reclaims it once it goes stale.
//!
//! ## Components
//!
//! - **Rate Limiter** (`rate_limiter`): Token bucket shared by all DAM calls
//! - **Error Classifier** (`classifier`): Transient / permanent / unknown failures
//! - **Single-Asset Sync** (`asset_sync`): Tag check, version diff, upload, upsert
//! - **Sync Orchestrator** (`orchestrator`): Runs one job across all candidates
//! - **Retry Engine** (`retry`): Re-runs failed assets, manually or automatically
//! - **Worker Loop** (`worker`): Polls, claims and runs jobs
//! - **Service** (`service`): Host-facing operations
//! - **Repository** (`repository`): SQLite persistence for jobs and asset mappings

pub mod asset;
pub mod asset_sync;
pub mod classifier;
pub mod clients;
pub mod db;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod rate_limiter;
pub mod repository;
pub mod retry;
pub mod service;
pub mod uploader;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use asset::{SyncOrigin, SyncedAsset};
pub use asset_sync::{AssetSyncOutcome, AssetSynchronizer, SkipReason};
pub use classifier::{
    categorize, classify, classify_batch, CategorizedError, ClassifiedBatch, ErrorCategory,
};
pub use clients::TenantClientSource;
pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, SyncError};
pub use job::{AssetError, SyncJob, SyncJobId, SyncJobStats, SyncStatus};
pub use orchestrator::{OrchestratorSettings, SyncOrchestrator, SyncSummary};
pub use rate_limiter::{RateLimitStats, RateLimitedDamClient, RateLimiter};
pub use repository::{
    SqliteSyncJobRepository, SqliteSyncedAssetRepository, SyncJobRepository,
    SyncedAssetRepository,
};
pub use retry::{RetryEngine, RetryReport, RetryTarget};
pub use service::SyncService;
pub use uploader::{AssetUploader, PlaceholderTemplater};
pub use worker::{PollOutcome, SyncWorker, WorkerSettings};
