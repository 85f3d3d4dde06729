use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("Sync job {job_id} is no longer held by worker {worker_id}")]
    ClaimLost { job_id: String, worker_id: String },

    #[error("Tenant {tenant_id} is not configured: {reason}")]
    TenantNotConfigured { tenant_id: String, reason: String },

    /// Collaborator failure; displays the upstream message unchanged.
    #[error("{0}")]
    Bridge(#[from] BridgeError),

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid sync status: {0}")]
    InvalidStatus(String),

    #[error("Invalid sync origin: {0}")]
    InvalidOrigin(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
