//! # Sync Job State Machine
//!
//! Manages the lifecycle of asset sync jobs with validated state transitions.
//!
//! ## Overview
//!
//! A `SyncJob` is one execution attempt of a tenant sync. Jobs are created in
//! `pending` by an external trigger, claimed by a worker, and finished by the
//! orchestrator or by an external cancellation observed mid-run. Jobs persist
//! across restarts via the job store, which is what makes stale reclaim possible.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓
//!     ├──────→ Failed
//!     └──────→ Cancelled
//! ```
//!
//! `Running → Running` is allowed only as a stale reclaim by another worker,
//! which keeps the original `started_at`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncJob, SyncJobStats};
//!
//! let job = SyncJob::new("acme", now);
//! let mut job = job.start("worker-a", now)?;
//!
//! job.record_progress(SyncJobStats { assets_processed: 1, ..Default::default() }, vec![], now)?;
//!
//! let job = job.complete(stats, errors, now)?;
//! ```

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncJobId(Uuid);

impl SyncJobId {
    /// Create a new random sync job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a sync job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::InvalidJobId(e.to_string()))?,
        ))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SyncJobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The current status of a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Job has been created but not yet claimed
    Pending,
    /// Job is claimed by a worker
    Running,
    /// Batch finished; residual per-asset errors may remain
    Completed,
    /// Batch-level failure (listing failure, missing configuration)
    Failed,
    /// Cancelled by an external request
    Cancelled,
}

impl SyncStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Completed | SyncStatus::Failed | SyncStatus::Cancelled
        )
    }

    /// Check if this status represents an active state
    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Running)
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
            SyncStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "running" => Ok(SyncStatus::Running),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            "cancelled" => Ok(SyncStatus::Cancelled),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Progress Types
// ============================================================================

/// Per-asset failure recorded on a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetError {
    pub asset_id: String,
    pub message: String,
}

impl AssetError {
    pub fn new(asset_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            message: message.into(),
        }
    }
}

/// Asset counters for a job run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJobStats {
    /// Candidates handled so far (created, updated, skipped or failed)
    pub assets_processed: u64,
    /// Assets imported for the first time
    pub assets_created: u64,
    /// Assets re-imported because the DAM version increased
    pub assets_updated: u64,
}

impl SyncJobStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Created plus updated
    pub fn total_synced(&self) -> u64 {
        self.assets_created + self.assets_updated
    }
}

// ============================================================================
// Sync Job Entity
// ============================================================================

/// A sync job with state machine semantics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    /// Unique identifier for this job
    pub id: SyncJobId,
    /// Owning tenant
    pub tenant_id: String,
    /// Current status
    pub status: SyncStatus,
    /// Asset counters
    pub stats: SyncJobStats,
    /// Ordered per-asset failures
    pub errors: Vec<AssetError>,
    /// Batch-level failure message
    pub fatal_error: Option<String>,
    /// When the job was created
    pub created_at: i64,
    /// Set once, at pending → running
    pub started_at: Option<i64>,
    /// Set once, at the transition into a terminal state
    pub completed_at: Option<i64>,
    /// Worker currently holding the job
    pub claimed_by: Option<String>,
    /// Last progress write by the holding worker
    pub heartbeat_at: Option<i64>,
}

impl SyncJob {
    /// Create a new sync job in pending state
    pub fn new(tenant_id: impl Into<String>, now: i64) -> Self {
        Self {
            id: SyncJobId::new(),
            tenant_id: tenant_id.into(),
            status: SyncStatus::Pending,
            stats: SyncJobStats::new(),
            errors: Vec::new(),
            fatal_error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            claimed_by: None,
            heartbeat_at: None,
        }
    }

    /// Claim a pending job
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Pending` state
    pub fn start(mut self, worker_id: &str, now: i64) -> Result<Self> {
        self.validate_transition(SyncStatus::Running)?;
        self.status = SyncStatus::Running;
        self.started_at = Some(now);
        self.claimed_by = Some(worker_id.to_string());
        self.heartbeat_at = Some(now);
        Ok(self)
    }

    /// Take over a stale running job. `started_at` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Running` state
    pub fn reclaim(mut self, worker_id: &str, now: i64) -> Result<Self> {
        if self.status != SyncStatus::Running {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: "reclaim".to_string(),
                reason: "Only running jobs can be reclaimed".to_string(),
            });
        }

        self.claimed_by = Some(worker_id.to_string());
        self.heartbeat_at = Some(now);
        Ok(self)
    }

    /// Record intermediate progress and refresh the heartbeat
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not running or if the processed count
    /// would go backwards
    pub fn record_progress(
        &mut self,
        stats: SyncJobStats,
        errors: Vec<AssetError>,
        now: i64,
    ) -> Result<()> {
        if self.status != SyncStatus::Running {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: "record_progress".to_string(),
                reason: "Job must be running to record progress".to_string(),
            });
        }

        self.ensure_monotonic(&stats)?;
        self.stats = stats;
        self.errors = errors;
        self.heartbeat_at = Some(now);
        Ok(())
    }

    /// Mark the job as completed. Residual per-asset errors do not fail the job.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Running` state
    pub fn complete(
        mut self,
        stats: SyncJobStats,
        errors: Vec<AssetError>,
        now: i64,
    ) -> Result<Self> {
        self.validate_transition(SyncStatus::Completed)?;
        self.ensure_monotonic(&stats)?;
        self.status = SyncStatus::Completed;
        self.completed_at = Some(now);
        self.stats = stats;
        self.errors = errors;
        Ok(self)
    }

    /// Mark the job as failed with a batch-level error message
    ///
    /// # Errors
    ///
    /// Returns an error if the job is already in a terminal state
    pub fn fail(mut self, message: impl Into<String>, now: i64) -> Result<Self> {
        self.validate_transition(SyncStatus::Failed)?;
        self.status = SyncStatus::Failed;
        self.completed_at = Some(now);
        self.fatal_error = Some(message.into());
        Ok(self)
    }

    /// Cancel the job
    ///
    /// # Errors
    ///
    /// Returns an error if the job is already in a terminal state
    pub fn cancel(mut self, now: i64) -> Result<Self> {
        self.validate_transition(SyncStatus::Cancelled)?;
        self.status = SyncStatus::Cancelled;
        self.completed_at = Some(now);
        Ok(self)
    }

    /// Attach the partial counts of an interrupted run to a cancelled job.
    ///
    /// # Errors
    ///
    /// Returns an error unless the job is `Cancelled`
    pub fn with_partial_progress(
        mut self,
        stats: SyncJobStats,
        errors: Vec<AssetError>,
    ) -> Result<Self> {
        if self.status != SyncStatus::Cancelled {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: "partial_progress".to_string(),
                reason: "Partial progress is only recorded on cancelled jobs".to_string(),
            });
        }

        self.ensure_monotonic(&stats)?;
        self.stats = stats;
        self.errors = errors;
        Ok(self)
    }

    /// Fold the successes of a manual retry back into a finished job: counters
    /// go up and the resolved assets leave the error list.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is still active
    pub fn apply_retry(
        &mut self,
        created: u64,
        updated: u64,
        resolved_asset_ids: &[String],
    ) -> Result<()> {
        if !self.status.is_terminal() {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: "apply_retry".to_string(),
                reason: "Retry results can only be merged into a finished job".to_string(),
            });
        }

        self.stats.assets_created += created;
        self.stats.assets_updated += updated;
        self.errors
            .retain(|e| !resolved_asset_ids.contains(&e.asset_id));
        Ok(())
    }

    /// Latest sign of life from the holding worker
    pub fn last_activity(&self) -> Option<i64> {
        match (self.heartbeat_at, self.started_at) {
            (Some(h), Some(s)) => Some(h.max(s)),
            (h, s) => h.or(s),
        }
    }

    /// A running job is stale when it shows no activity within the threshold,
    /// or when it has never recorded any.
    pub fn is_stale(&self, now: i64, stale_after_secs: i64) -> bool {
        if self.status != SyncStatus::Running {
            return false;
        }

        match self.last_activity() {
            Some(at) => now - at > stale_after_secs,
            None => true,
        }
    }

    /// Get the duration of the job in seconds
    ///
    /// Returns None if the job hasn't started or completed yet
    pub fn duration_secs(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start).max(0) as u64),
            _ => None,
        }
    }

    fn ensure_monotonic(&self, stats: &SyncJobStats) -> Result<()> {
        if stats.assets_processed < self.stats.assets_processed {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: self.status.as_str().to_string(),
                reason: format!(
                    "Processed count cannot decrease ({} -> {})",
                    self.stats.assets_processed, stats.assets_processed
                ),
            });
        }
        Ok(())
    }

    /// Validate a state transition
    fn validate_transition(&self, to: SyncStatus) -> Result<()> {
        let valid = match (self.status, to) {
            // From Pending
            (SyncStatus::Pending, SyncStatus::Running) => true,
            (SyncStatus::Pending, SyncStatus::Cancelled) => true,
            (SyncStatus::Pending, SyncStatus::Failed) => true,

            // From Running
            (SyncStatus::Running, SyncStatus::Completed) => true,
            (SyncStatus::Running, SyncStatus::Failed) => true,
            (SyncStatus::Running, SyncStatus::Cancelled) => true,

            // Terminal states cannot transition
            (SyncStatus::Completed, _) => false,
            (SyncStatus::Failed, _) => false,
            (SyncStatus::Cancelled, _) => false,

            // All other transitions are invalid
            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
