//! # Sync Repositories
//!
//! Provides database persistence for sync jobs and synced asset mappings.
//!
//! ## Overview
//!
//! - `SyncJobRepository`: job CRUD, the oldest-runnable query, the atomic
//!   claim used by competing workers, and status-guarded updates.
//! - `SyncedAssetRepository`: asset mapping lookups and the version-monotonic
//!   upsert keyed by (tenant, DAM asset id).
//!
//! The per-job error list and the asset tag list are typed in the domain and
//! stored as JSON text; (de)serialization happens only here.

use crate::asset::{SyncOrigin, SyncedAsset};
use crate::job::{AssetError, SyncJob, SyncJobId, SyncJobStats, SyncStatus};
use crate::{Result, SyncError};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

// ============================================================================
// Repository Traits
// ============================================================================

/// Repository trait for sync job persistence
#[async_trait]
pub trait SyncJobRepository: Send + Sync {
    /// Insert a new sync job
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn insert(&self, job: &SyncJob) -> Result<()>;

    /// Overwrite an existing sync job
    ///
    /// # Errors
    ///
    /// Returns `JobNotFound` if the job doesn't exist
    async fn update(&self, job: &SyncJob) -> Result<()>;

    /// Overwrite a job only if its stored status is still `expected`.
    ///
    /// Returns `false` when another writer changed the status first.
    async fn update_if_status(&self, job: &SyncJob, expected: SyncStatus) -> Result<bool>;

    /// Overwrite a job only if its stored status is still `expected` and it is
    /// still held by `owner`.
    ///
    /// Returns `false` when the status changed or another worker took the
    /// job over.
    async fn update_if_owned(
        &self,
        job: &SyncJob,
        expected: SyncStatus,
        owner: Option<&str>,
    ) -> Result<bool>;

    /// Find a sync job by ID
    async fn find_by_id(&self, id: &SyncJobId) -> Result<Option<SyncJob>>;

    /// Oldest job that is pending, or running with no activity since
    /// `stale_before` (or none at all)
    async fn find_next_runnable(&self, stale_before: i64) -> Result<Option<SyncJob>>;

    /// Atomically move `observed` into the `claimed` state.
    ///
    /// Succeeds only if the stored status, owner and heartbeat still match
    /// what the caller observed. Losing the race returns `false`.
    async fn try_claim(&self, observed: &SyncJob, claimed: &SyncJob) -> Result<bool>;

    /// Persist counters, errors and heartbeat of a running job held by the
    /// job's `claimed_by` worker.
    ///
    /// Returns `false` if the job is no longer running under that worker.
    async fn record_progress(&self, job: &SyncJob) -> Result<bool>;

    /// Job history for a tenant, most recent first
    async fn list_by_tenant(&self, tenant_id: &str, limit: u32) -> Result<Vec<SyncJob>>;
}

/// Repository trait for synced asset mappings
#[async_trait]
pub trait SyncedAssetRepository: Send + Sync {
    /// Find the mapping for one DAM asset
    async fn find(&self, tenant_id: &str, dam_asset_id: &str) -> Result<Option<SyncedAsset>>;

    /// Insert or update a mapping. An existing row is only replaced when the
    /// incoming version is strictly newer.
    ///
    /// Returns whether the write was applied.
    async fn upsert(&self, asset: &SyncedAsset) -> Result<bool>;

    /// All mappings for a tenant, most recently synced first
    async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<SyncedAsset>>;
}

// ============================================================================
// SQLite Job Repository
// ============================================================================

/// SQLite implementation of SyncJobRepository
pub struct SqliteSyncJobRepository {
    pool: SqlitePool,
}

impl SqliteSyncJobRepository {
    /// Create a new SQLite sync job repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const JOB_COLUMNS: &str = r#"
    id, tenant_id, status,
    assets_processed, assets_created, assets_updated,
    errors, fatal_error,
    created_at, started_at, completed_at,
    claimed_by, heartbeat_at
"#;

/// Database row representation of a sync job
#[derive(Debug, FromRow)]
struct SyncJobRow {
    id: String,
    tenant_id: String,
    status: String,
    assets_processed: i64,
    assets_created: i64,
    assets_updated: i64,
    errors: String,
    fatal_error: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    claimed_by: Option<String>,
    heartbeat_at: Option<i64>,
}

impl TryFrom<SyncJobRow> for SyncJob {
    type Error = SyncError;

    fn try_from(row: SyncJobRow) -> Result<Self> {
        let status: SyncStatus = row.status.parse()?;
        let errors: Vec<AssetError> = serde_json::from_str(&row.errors).map_err(|e| {
            SyncError::Serialization(format!("Invalid errors for job {}: {}", row.id, e))
        })?;

        Ok(SyncJob {
            id: SyncJobId::from_string(&row.id)?,
            tenant_id: row.tenant_id,
            status,
            stats: SyncJobStats {
                assets_processed: row.assets_processed.max(0) as u64,
                assets_created: row.assets_created.max(0) as u64,
                assets_updated: row.assets_updated.max(0) as u64,
            },
            errors,
            fatal_error: row.fatal_error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            claimed_by: row.claimed_by,
            heartbeat_at: row.heartbeat_at,
        })
    }
}

fn encode_errors(errors: &[AssetError]) -> Result<String> {
    serde_json::to_string(errors).map_err(|e| SyncError::Serialization(e.to_string()))
}

#[async_trait]
impl SyncJobRepository for SqliteSyncJobRepository {
    async fn insert(&self, job: &SyncJob) -> Result<()> {
        let errors = encode_errors(&job.errors)?;

        sqlx::query(
            r#"
            INSERT INTO sync_jobs (
                id, tenant_id, status,
                assets_processed, assets_created, assets_updated,
                errors, fatal_error,
                created_at, started_at, completed_at,
                claimed_by, heartbeat_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.as_str())
        .bind(&job.tenant_id)
        .bind(job.status.as_str())
        .bind(job.stats.assets_processed as i64)
        .bind(job.stats.assets_created as i64)
        .bind(job.stats.assets_updated as i64)
        .bind(errors)
        .bind(&job.fatal_error)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.claimed_by)
        .bind(job.heartbeat_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn update(&self, job: &SyncJob) -> Result<()> {
        let errors = encode_errors(&job.errors)?;

        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                status = ?,
                assets_processed = ?,
                assets_created = ?,
                assets_updated = ?,
                errors = ?,
                fatal_error = ?,
                started_at = ?,
                completed_at = ?,
                claimed_by = ?,
                heartbeat_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.stats.assets_processed as i64)
        .bind(job.stats.assets_created as i64)
        .bind(job.stats.assets_updated as i64)
        .bind(errors)
        .bind(&job.fatal_error)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.claimed_by)
        .bind(job.heartbeat_at)
        .bind(job.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::JobNotFound {
                job_id: job.id.to_string(),
            });
        }

        Ok(())
    }

    async fn update_if_status(&self, job: &SyncJob, expected: SyncStatus) -> Result<bool> {
        let errors = encode_errors(&job.errors)?;

        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                status = ?,
                assets_processed = ?,
                assets_created = ?,
                assets_updated = ?,
                errors = ?,
                fatal_error = ?,
                started_at = ?,
                completed_at = ?,
                claimed_by = ?,
                heartbeat_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.stats.assets_processed as i64)
        .bind(job.stats.assets_created as i64)
        .bind(job.stats.assets_updated as i64)
        .bind(errors)
        .bind(&job.fatal_error)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.claimed_by)
        .bind(job.heartbeat_at)
        .bind(job.id.as_str())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_if_owned(
        &self,
        job: &SyncJob,
        expected: SyncStatus,
        owner: Option<&str>,
    ) -> Result<bool> {
        let errors = encode_errors(&job.errors)?;

        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                status = ?,
                assets_processed = ?,
                assets_created = ?,
                assets_updated = ?,
                errors = ?,
                fatal_error = ?,
                started_at = ?,
                completed_at = ?,
                claimed_by = ?,
                heartbeat_at = ?
            WHERE id = ? AND status = ? AND claimed_by IS ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.stats.assets_processed as i64)
        .bind(job.stats.assets_created as i64)
        .bind(job.stats.assets_updated as i64)
        .bind(errors)
        .bind(&job.fatal_error)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.claimed_by)
        .bind(job.heartbeat_at)
        .bind(job.id.as_str())
        .bind(expected.as_str())
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: &SyncJobId) -> Result<Option<SyncJob>> {
        let sql = format!("SELECT {} FROM sync_jobs WHERE id = ?", JOB_COLUMNS);
        let row = sqlx::query_as::<_, SyncJobRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(SyncJob::try_from).transpose()
    }

    async fn find_next_runnable(&self, stale_before: i64) -> Result<Option<SyncJob>> {
        let sql = format!(
            r#"
            SELECT {} FROM sync_jobs
            WHERE status = 'pending'
               OR (status = 'running'
                   AND COALESCE(MAX(heartbeat_at, started_at), heartbeat_at, started_at, 0) < ?)
            ORDER BY created_at ASC, rowid ASC
            LIMIT 1
            "#,
            JOB_COLUMNS
        );
        let row = sqlx::query_as::<_, SyncJobRow>(&sql)
            .bind(stale_before)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(SyncJob::try_from).transpose()
    }

    async fn try_claim(&self, observed: &SyncJob, claimed: &SyncJob) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                status = ?,
                started_at = ?,
                claimed_by = ?,
                heartbeat_at = ?
            WHERE id = ?
              AND status = ?
              AND claimed_by IS ?
              AND heartbeat_at IS ?
            "#,
        )
        .bind(claimed.status.as_str())
        .bind(claimed.started_at)
        .bind(&claimed.claimed_by)
        .bind(claimed.heartbeat_at)
        .bind(observed.id.as_str())
        .bind(observed.status.as_str())
        .bind(&observed.claimed_by)
        .bind(observed.heartbeat_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_progress(&self, job: &SyncJob) -> Result<bool> {
        let errors = encode_errors(&job.errors)?;

        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                assets_processed = ?,
                assets_created = ?,
                assets_updated = ?,
                errors = ?,
                heartbeat_at = ?
            WHERE id = ?
              AND status = 'running'
              AND claimed_by IS ?
              AND assets_processed <= ?
            "#,
        )
        .bind(job.stats.assets_processed as i64)
        .bind(job.stats.assets_created as i64)
        .bind(job.stats.assets_updated as i64)
        .bind(errors)
        .bind(job.heartbeat_at)
        .bind(job.id.as_str())
        .bind(&job.claimed_by)
        .bind(job.stats.assets_processed as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_by_tenant(&self, tenant_id: &str, limit: u32) -> Result<Vec<SyncJob>> {
        let sql = format!(
            r#"
            SELECT {} FROM sync_jobs
            WHERE tenant_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
            JOB_COLUMNS
        );
        let rows = sqlx::query_as::<_, SyncJobRow>(&sql)
            .bind(tenant_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter().map(SyncJob::try_from).collect()
    }
}

// ============================================================================
// SQLite Asset Repository
// ============================================================================

/// SQLite implementation of SyncedAssetRepository
pub struct SqliteSyncedAssetRepository {
    pool: SqlitePool,
}

impl SqliteSyncedAssetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SyncedAssetRow {
    tenant_id: String,
    dam_asset_id: String,
    file_id: String,
    origin: String,
    tags: String,
    dam_version: i64,
    synced_at: i64,
}

impl TryFrom<SyncedAssetRow> for SyncedAsset {
    type Error = SyncError;

    fn try_from(row: SyncedAssetRow) -> Result<Self> {
        let tags: Vec<String> = serde_json::from_str(&row.tags).map_err(|e| {
            SyncError::Serialization(format!("Invalid tags for asset {}: {}", row.dam_asset_id, e))
        })?;
        let dam_version = u64::try_from(row.dam_version).map_err(|_| {
            SyncError::Database(format!(
                "Negative version {} for asset {}",
                row.dam_version, row.dam_asset_id
            ))
        })?;

        Ok(SyncedAsset {
            tenant_id: row.tenant_id,
            dam_asset_id: row.dam_asset_id,
            file_id: row.file_id,
            origin: row.origin.parse::<SyncOrigin>()?,
            tags,
            dam_version,
            synced_at: row.synced_at,
        })
    }
}

#[async_trait]
impl SyncedAssetRepository for SqliteSyncedAssetRepository {
    async fn find(&self, tenant_id: &str, dam_asset_id: &str) -> Result<Option<SyncedAsset>> {
        let row = sqlx::query_as::<_, SyncedAssetRow>(
            r#"
            SELECT tenant_id, dam_asset_id, file_id, origin, tags, dam_version, synced_at
            FROM synced_assets
            WHERE tenant_id = ? AND dam_asset_id = ?
            "#,
        )
        .bind(tenant_id)
        .bind(dam_asset_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(SyncedAsset::try_from).transpose()
    }

    async fn upsert(&self, asset: &SyncedAsset) -> Result<bool> {
        let tags = serde_json::to_string(&asset.tags)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;
        let dam_version = i64::try_from(asset.dam_version).map_err(|_| {
            SyncError::InvalidInput(format!("Version {} out of range", asset.dam_version))
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO synced_assets (
                tenant_id, dam_asset_id, file_id, origin, tags, dam_version, synced_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tenant_id, dam_asset_id) DO UPDATE SET
                file_id = excluded.file_id,
                origin = excluded.origin,
                tags = excluded.tags,
                dam_version = excluded.dam_version,
                synced_at = excluded.synced_at
            WHERE excluded.dam_version > synced_assets.dam_version
            "#,
        )
        .bind(&asset.tenant_id)
        .bind(&asset.dam_asset_id)
        .bind(&asset.file_id)
        .bind(asset.origin.as_str())
        .bind(tags)
        .bind(dam_version)
        .bind(asset.synced_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<SyncedAsset>> {
        let rows = sqlx::query_as::<_, SyncedAssetRow>(
            r#"
            SELECT tenant_id, dam_asset_id, file_id, origin, tags, dam_version, synced_at
            FROM synced_assets
            WHERE tenant_id = ?
            ORDER BY synced_at DESC, dam_asset_id ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter().map(SyncedAsset::try_from).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
