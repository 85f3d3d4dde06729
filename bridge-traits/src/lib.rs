//! # Collaborator Traits
//!
//! Contracts for the external systems the asset sync engine talks to.
//!
//! ## Overview
//!
//! The engine itself owns job orchestration, rate limiting, retry and persistence.
//! Everything it consumes from the outside world is expressed here as a trait so
//! hosts can inject real clients in production and fakes in tests.
//!
//! ## Traits
//!
//! ### Remote systems
//! - [`DamClient`](dam::DamClient) - Tag listing, metadata, download URL and binary fetch
//! - [`DestinationStore`](destination::DestinationStore) - File upload and metadata write
//!
//! ### Tenant configuration
//! - [`TenantConfigProvider`](tenant::TenantConfigProvider) - Sync tags and naming options
//! - [`TenantClientResolver`](tenant::TenantClientResolver) - Tenant-scoped client construction
//! - [`AssetPathTemplater`](naming::AssetPathTemplater) - Destination filename/path rendering
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All collaborator traits use [`BridgeError`](error::BridgeError). Implementations
//! should keep the upstream message intact (HTTP status, "Service Unavailable",
//! "timeout", ...): per-asset failures are classified as transient or permanent
//! from that text.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` so one client can be shared by the worker loop,
//! retries and manual single-asset syncs.
//!
//! ## Examples
//!
//! ### Implementing DestinationStore
//!
//! ```ignore
//! use bridge_traits::destination::{AssetMetadataFields, DestinationStore, UploadRequest, UploadedFile};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyStore {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl DestinationStore for MyStore {
//!     async fn upload(&self, request: UploadRequest) -> Result<UploadedFile> {
//!         // Implementation
//!         todo!()
//!     }
//!
//!     async fn set_metadata(&self, file_id: &str, fields: &AssetMetadataFields) -> Result<()> {
//!         // Implementation
//!         todo!()
//!     }
//! }
//! ```

pub mod dam;
pub mod destination;
pub mod error;
pub mod naming;
pub mod tenant;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use dam::{DamAssetMetadata, DamAssetSummary, DamClient};
pub use destination::{AssetMetadataFields, DestinationStore, UploadRequest, UploadedFile};
pub use naming::AssetPathTemplater;
pub use tenant::{
    NamingOptions, TenantClientResolver, TenantClients, TenantConfigProvider, TenantSettings,
};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
