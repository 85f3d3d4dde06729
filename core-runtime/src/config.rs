//! # Sync Engine Configuration Module
//!
//! Provides configuration management for the asset sync engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `SyncEngineConfig`
//! instance that holds the host collaborators and tuning knobs for the engine.
//! It enforces fail-fast validation so a misconfigured worker never starts polling.
//!
//! ## Required Dependencies
//!
//! - `TenantConfigProvider` - Sync tags and naming options per tenant
//! - `TenantClientResolver` - Tenant-scoped DAM and destination clients
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `AssetPathTemplater` - Destination path rendering (default: placeholder templater)
//! - `Clock` - Time source (default: `SystemClock`)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SyncEngineConfig;
//! use std::sync::Arc;
//!
//! let config = SyncEngineConfig::builder()
//!     .database_path("/var/lib/dam-sync/jobs.db")
//!     .tenant_config(Arc::new(MyTenantConfig))
//!     .client_resolver(Arc::new(MyClientResolver))
//!     .requests_per_second(4.5)
//!     .burst_capacity(10)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! The builder validates all required dependencies and provides actionable error
//! messages when capabilities are missing:
//!
//! ```ignore
//! use core_runtime::config::SyncEngineConfig;
//!
//! // Fails: no TenantConfigProvider / TenantClientResolver injected
//! let config = SyncEngineConfig::builder().build();
//! assert!(config.is_err());
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    AssetPathTemplater, Clock, SystemClock, TenantClientResolver, TenantConfigProvider,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default DAM request rate (requests per second)
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 4.5;
/// Default token bucket size
pub const DEFAULT_BURST_CAPACITY: u32 = 10;
/// Default idle delay between worker polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default age after which a running job without progress is reclaimable
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);
/// Default wait before the automatic transient-retry pass
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);
/// Default capacity of the lifecycle event channel
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Configuration for the asset sync engine.
///
/// Use [`SyncEngineConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct SyncEngineConfig {
    /// Path to the SQLite job database; `None` keeps everything in memory
    pub database_path: Option<PathBuf>,

    /// Token refill rate for outbound DAM calls
    pub requests_per_second: f64,

    /// Token bucket size (and initial token count)
    pub burst_capacity: u32,

    /// Sleep between polls when no job is runnable
    pub poll_interval: Duration,

    /// A running job whose last progress is older than this is considered crashed
    pub stale_after: Duration,

    /// Fixed wait before the automatic retry of transient failures
    pub retry_backoff: Duration,

    /// Run the automatic transient-retry pass after each batch
    pub auto_retry_transient: bool,

    /// Identifier recorded on jobs claimed by this process
    pub worker_id: String,

    /// Capacity of the lifecycle event broadcast channel
    pub event_buffer_size: usize,

    /// Tenant settings source (required)
    pub tenant_config: Arc<dyn TenantConfigProvider>,

    /// Tenant client factory (required)
    pub client_resolver: Arc<dyn TenantClientResolver>,

    /// Destination path renderer (optional)
    pub path_templater: Option<Arc<dyn AssetPathTemplater>>,

    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SyncEngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngineConfig")
            .field("database_path", &self.database_path)
            .field("requests_per_second", &self.requests_per_second)
            .field("burst_capacity", &self.burst_capacity)
            .field("poll_interval", &self.poll_interval)
            .field("stale_after", &self.stale_after)
            .field("retry_backoff", &self.retry_backoff)
            .field("auto_retry_transient", &self.auto_retry_transient)
            .field("worker_id", &self.worker_id)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("tenant_config", &"TenantConfigProvider { ... }")
            .field("client_resolver", &"TenantClientResolver { ... }")
            .field(
                "path_templater",
                &self
                    .path_templater
                    .as_ref()
                    .map(|_| "AssetPathTemplater { ... }"),
            )
            .finish()
    }
}

impl SyncEngineConfig {
    /// Creates a new builder for constructing a `SyncEngineConfig`.
    pub fn builder() -> SyncEngineConfigBuilder {
        SyncEngineConfigBuilder::default()
    }

    /// Staleness threshold in whole seconds, as compared against stored timestamps.
    pub fn stale_after_secs(&self) -> i64 {
        self.stale_after.as_secs() as i64
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty (when set)
    /// - Rate limit is positive and finite, burst capacity at least one token
    /// - Poll interval and staleness threshold are non-zero
    /// - Worker id is not blank
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(Error::Config(format!(
                "Requests per second must be a positive number, got {}",
                self.requests_per_second
            )));
        }

        if self.burst_capacity == 0 {
            return Err(Error::Config(
                "Burst capacity must be at least 1 token".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(Error::Config(
                "Poll interval must be greater than zero".to_string(),
            ));
        }

        if self.stale_after.as_secs() == 0 {
            return Err(Error::Config(
                "Staleness threshold must be at least one second".to_string(),
            ));
        }

        if self.worker_id.trim().is_empty() {
            return Err(Error::Config("Worker id cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn tenant_config_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "TenantConfigProvider".to_string(),
        message: "TenantConfigProvider implementation is required to read sync tags \
                 and naming options. Inject one with .tenant_config()."
            .to_string(),
    }
}

fn client_resolver_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "TenantClientResolver".to_string(),
        message: "TenantClientResolver implementation is required to build DAM and \
                 destination clients per tenant. Inject one with .client_resolver()."
            .to_string(),
    }
}

/// Builder for constructing [`SyncEngineConfig`] instances.
#[derive(Default)]
pub struct SyncEngineConfigBuilder {
    database_path: Option<PathBuf>,
    requests_per_second: Option<f64>,
    burst_capacity: Option<u32>,
    poll_interval: Option<Duration>,
    stale_after: Option<Duration>,
    retry_backoff: Option<Duration>,
    auto_retry_transient: Option<bool>,
    worker_id: Option<String>,
    event_buffer_size: Option<usize>,
    tenant_config: Option<Arc<dyn TenantConfigProvider>>,
    client_resolver: Option<Arc<dyn TenantClientResolver>>,
    path_templater: Option<Arc<dyn AssetPathTemplater>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SyncEngineConfigBuilder {
    /// Sets the database path. Without one the engine uses an in-memory database.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// use core_runtime::config::SyncEngineConfig;
    ///
    /// let builder = SyncEngineConfig::builder()
    ///     .database_path("/var/lib/dam-sync/jobs.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the DAM request rate.
    ///
    /// Default: 4.5 requests per second
    pub fn requests_per_second(mut self, rate: f64) -> Self {
        self.requests_per_second = Some(rate);
        self
    }

    /// Sets the token bucket size.
    ///
    /// Default: 10
    pub fn burst_capacity(mut self, capacity: u32) -> Self {
        self.burst_capacity = Some(capacity);
        self
    }

    /// Default: 5 seconds
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Default: 5 minutes
    pub fn stale_after(mut self, threshold: Duration) -> Self {
        self.stale_after = Some(threshold);
        self
    }

    /// Default: 5 seconds
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = Some(backoff);
        self
    }

    /// Enables or disables the automatic transient-retry pass.
    ///
    /// Default: true
    pub fn auto_retry_transient(mut self, enabled: bool) -> Self {
        self.auto_retry_transient = Some(enabled);
        self
    }

    /// Sets the worker identity used when claiming jobs.
    ///
    /// Default: `worker-<uuid>`
    pub fn worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = Some(id.into());
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the tenant configuration provider (required).
    pub fn tenant_config(mut self, provider: Arc<dyn TenantConfigProvider>) -> Self {
        self.tenant_config = Some(provider);
        self
    }

    /// Sets the tenant client resolver (required).
    pub fn client_resolver(mut self, resolver: Arc<dyn TenantClientResolver>) -> Self {
        self.client_resolver = Some(resolver);
        self
    }

    pub fn path_templater(mut self, templater: Arc<dyn AssetPathTemplater>) -> Self {
        self.path_templater = Some(templater);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `SyncEngineConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required collaborators are missing (TenantConfigProvider, TenantClientResolver)
    /// - Configuration values are invalid
    pub fn build(self) -> Result<SyncEngineConfig> {
        let tenant_config = self.tenant_config.ok_or_else(tenant_config_missing_error)?;
        let client_resolver = self
            .client_resolver
            .ok_or_else(client_resolver_missing_error)?;

        let config = SyncEngineConfig {
            database_path: self.database_path,
            requests_per_second: self
                .requests_per_second
                .unwrap_or(DEFAULT_REQUESTS_PER_SECOND),
            burst_capacity: self.burst_capacity.unwrap_or(DEFAULT_BURST_CAPACITY),
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            stale_after: self.stale_after.unwrap_or(DEFAULT_STALE_AFTER),
            retry_backoff: self.retry_backoff.unwrap_or(DEFAULT_RETRY_BACKOFF),
            auto_retry_transient: self.auto_retry_transient.unwrap_or(true),
            worker_id: self
                .worker_id
                .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4())),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            tenant_config,
            client_resolver,
            path_templater: self.path_templater,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
