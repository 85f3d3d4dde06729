//! # DAM Rate Limiter
//!
//! Token-bucket governor shared by every outbound DAM call in the process.
//!
//! ## Overview
//!
//! The bucket starts full (`burst_capacity` tokens) and refills continuously at
//! `requests_per_second`, capped at `burst_capacity`. `acquire()` takes one token;
//! when none is available the caller reserves the next one and sleeps until it
//! has accrued. Reservations are made under the lock and sleeping happens outside
//! it, so concurrent callers queue up behind each other instead of all waking at
//! the same instant.
//!
//! The limiter is constructed once and injected (see [`RateLimitedDamClient`]);
//! there is no process-global instance.

use async_trait::async_trait;
use bridge_traits::dam::{DamAssetMetadata, DamAssetSummary, DamClient};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::tenant::TenantClients;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug)]
struct BucketState {
    /// May go negative while callers hold reservations
    tokens: f64,
    last_refill: Instant,
    hits: u64,
}

/// Snapshot of limiter state for observability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStats {
    pub requests_per_second: f64,
    pub burst_capacity: u32,
    /// Tokens available right now (zero while callers are queued)
    pub available_tokens: f64,
    /// Number of `acquire()` calls that had to wait
    pub rate_limit_hits: u64,
}

/// Token bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_second: f64,
    burst_capacity: u32,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a full bucket.
    ///
    /// Callers validate the parameters (see `SyncEngineConfig::validate`); a
    /// non-positive rate is clamped to a minimal positive one.
    pub fn new(requests_per_second: f64, burst_capacity: u32) -> Self {
        let requests_per_second = if requests_per_second.is_finite() && requests_per_second > 0.0
        {
            requests_per_second
        } else {
            f64::MIN_POSITIVE
        };
        let burst_capacity = burst_capacity.max(1);

        Self {
            requests_per_second,
            burst_capacity,
            state: Mutex::new(BucketState {
                tokens: burst_capacity as f64,
                last_refill: Instant::now(),
                hits: 0,
            }),
        }
    }

    /// Wait until a request may be sent. Never fails.
    pub async fn acquire(&self) {
        let wait = {
            let mut state = self.state.lock().await;
            self.refill(&mut state);

            state.tokens -= 1.0;
            if state.tokens >= 0.0 {
                None
            } else {
                state.hits += 1;
                let deficit = -state.tokens;
                let wait_ms = (deficit / self.requests_per_second * 1000.0).ceil();
                Some(Duration::from_millis(wait_ms as u64))
            }
        };

        if let Some(wait) = wait {
            debug!("Rate limiting: waiting {:?}", wait);
            sleep(wait).await;
        }
    }

    pub async fn stats(&self) -> RateLimitStats {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        RateLimitStats {
            requests_per_second: self.requests_per_second,
            burst_capacity: self.burst_capacity,
            available_tokens: state.tokens.max(0.0),
            rate_limit_hits: state.hits,
        }
    }

    /// Reset the hit counter. Token state is left alone.
    pub async fn reset_hits(&self) {
        self.state.lock().await.hits = 0;
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.requests_per_second)
            .min(self.burst_capacity as f64);
        state.last_refill = now;
    }
}

/// `DamClient` decorator that takes a limiter token before every request.
pub struct RateLimitedDamClient {
    inner: Arc<dyn DamClient>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedDamClient {
    pub fn new(inner: Arc<dyn DamClient>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

/// Route a tenant's DAM traffic through the shared limiter.
pub fn rate_limited_clients(clients: TenantClients, limiter: &Arc<RateLimiter>) -> TenantClients {
    TenantClients {
        dam: Arc::new(RateLimitedDamClient::new(clients.dam, Arc::clone(limiter))),
        destination: clients.destination,
    }
}

#[async_trait]
impl DamClient for RateLimitedDamClient {
    async fn list_assets_by_tag(&self, tag: &str) -> BridgeResult<Vec<DamAssetSummary>> {
        self.limiter.acquire().await;
        self.inner.list_assets_by_tag(tag).await
    }

    async fn get_asset_metadata(&self, asset_id: &str) -> BridgeResult<DamAssetMetadata> {
        self.limiter.acquire().await;
        self.inner.get_asset_metadata(asset_id).await
    }

    async fn get_download_url(&self, asset_id: &str) -> BridgeResult<String> {
        self.limiter.acquire().await;
        self.inner.get_download_url(asset_id).await
    }

    async fn download(&self, url: &str) -> BridgeResult<Bytes> {
        self.limiter.acquire().await;
        self.inner.download(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Dam {}

        #[async_trait]
        impl DamClient for Dam {
            async fn list_assets_by_tag(&self, tag: &str) -> BridgeResult<Vec<DamAssetSummary>>;
            async fn get_asset_metadata(&self, asset_id: &str) -> BridgeResult<DamAssetMetadata>;
            async fn get_download_url(&self, asset_id: &str) -> BridgeResult<String>;
            async fn download(&self, url: &str) -> BridgeResult<Bytes>;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_granted_immediately() {
        let limiter = RateLimiter::new(2.0, 3);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.stats().await.rate_limit_hits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_after_burst_for_one_token_period() {
        let limiter = RateLimiter::new(2.0, 3);
        for _ in 0..3 {
            limiter.acquire().await;
        }

        let start = Instant::now();
        limiter.acquire().await;
        let waited = start.elapsed();

        // (1 - 0 fractional tokens) / 2 rps
        assert!(waited >= Duration::from_millis(500), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(520), "waited {:?}", waited);
        assert_eq!(limiter.stats().await.rate_limit_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_refill_shortens_wait() {
        let limiter = RateLimiter::new(4.0, 1);
        limiter.acquire().await;

        // Half a token accrues in 125ms at 4 rps
        tokio::time::advance(Duration::from_millis(125)).await;

        let start = Instant::now();
        limiter.acquire().await;
        let waited = start.elapsed();

        assert!(waited >= Duration::from_millis(125), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(140), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped_at_capacity() {
        let limiter = RateLimiter::new(10.0, 2);
        tokio::time::advance(Duration::from_secs(60)).await;

        let stats = limiter.stats().await;
        assert_eq!(stats.available_tokens, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_serialized() {
        let limiter = Arc::new(RateLimiter::new(10.0, 1));
        let start = Instant::now();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // One immediate grant, four more at 100ms spacing
        assert!(start.elapsed() >= Duration::from_millis(400));
        assert_eq!(limiter.stats().await.rate_limit_hits, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_hits() {
        let limiter = RateLimiter::new(100.0, 1);
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.stats().await.rate_limit_hits, 1);

        limiter.reset_hits().await;
        assert_eq!(limiter.stats().await.rate_limit_hits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_client_gates_every_call() {
        let mut dam = MockDam::new();
        dam.expect_list_assets_by_tag()
            .times(2)
            .returning(|_| Ok(vec![]));
        dam.expect_get_download_url()
            .times(1)
            .returning(|id| Ok(format!("https://dam.test/{}", id)));

        let limiter = Arc::new(RateLimiter::new(1.0, 2));
        let client = RateLimitedDamClient::new(Arc::new(dam), Arc::clone(&limiter));

        let start = Instant::now();
        client.list_assets_by_tag("promo").await.unwrap();
        client.list_assets_by_tag("sale").await.unwrap();
        let url = client.get_download_url("a1").await.unwrap();

        assert_eq!(url, "https://dam.test/a1");
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(limiter.stats().await.rate_limit_hits, 1);
    }
}
