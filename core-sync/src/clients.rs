//! Resolves per-tenant collaborators with DAM traffic routed through the
//! process-wide rate limiter.

use crate::rate_limiter::{rate_limited_clients, RateLimiter};
use crate::{Result, SyncError};
use bridge_traits::tenant::{TenantClientResolver, TenantClients};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct TenantClientSource {
    resolver: Arc<dyn TenantClientResolver>,
    limiter: Arc<RateLimiter>,
}

impl TenantClientSource {
    pub fn new(resolver: Arc<dyn TenantClientResolver>, limiter: Arc<RateLimiter>) -> Self {
        Self { resolver, limiter }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Rate-limited clients for `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns `TenantNotConfigured` when the host has no clients for the
    /// tenant or fails to build them.
    pub async fn clients(&self, tenant_id: &str) -> Result<TenantClients> {
        match self.resolver.resolve(tenant_id).await {
            Ok(Some(clients)) => Ok(rate_limited_clients(clients, &self.limiter)),
            Ok(None) => Err(SyncError::TenantNotConfigured {
                tenant_id: tenant_id.to_string(),
                reason: "no DAM or destination credentials".to_string(),
            }),
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "Failed to resolve tenant clients");
                Err(SyncError::TenantNotConfigured {
                    tenant_id: tenant_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDam, FakeDestination, StaticResolver};

    #[tokio::test]
    async fn test_missing_tenant_is_not_configured() {
        let source = TenantClientSource::new(
            Arc::new(StaticResolver::new()),
            Arc::new(RateLimiter::new(10.0, 10)),
        );

        let err = source.clients("acme").await.unwrap_err();
        assert!(matches!(err, SyncError::TenantNotConfigured { .. }));
    }

    #[tokio::test]
    async fn test_resolved_clients_consume_limiter_tokens() {
        let resolver = StaticResolver::new().with_clients(
            "acme",
            Arc::new(FakeDam::new()),
            Arc::new(FakeDestination::new()),
        );
        let limiter = Arc::new(RateLimiter::new(1.0, 5));
        let source = TenantClientSource::new(Arc::new(resolver), Arc::clone(&limiter));

        let clients = source.clients("acme").await.unwrap();
        clients.dam.list_assets_by_tag("promo").await.unwrap();

        let stats = limiter.stats().await;
        assert!(stats.available_tokens < 5.0);
    }
}
