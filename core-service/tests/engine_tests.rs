//! Bootstrap and worker lifecycle through the façade.

#[path = "../../core-sync/src/test_support.rs"]
mod fakes;

use core_service::{CoreError, SyncEngine, SyncEngineConfig, SyncStatus};
use fakes::{metadata, FakeDam, FakeDestination, StaticResolver, StaticTenantConfig};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

struct Hosts {
    dam: Arc<FakeDam>,
    destination: Arc<FakeDestination>,
    tenants: Arc<StaticTenantConfig>,
    resolver: Arc<StaticResolver>,
}

fn hosts() -> Hosts {
    let dam = Arc::new(FakeDam::new());
    let destination = Arc::new(FakeDestination::new());
    let tenants = Arc::new(StaticTenantConfig::new().with_tenant("acme", &["promo"]));
    let resolver = Arc::new(StaticResolver::new().with_clients(
        "acme",
        dam.clone(),
        destination.clone(),
    ));
    Hosts {
        dam,
        destination,
        tenants,
        resolver,
    }
}

fn config(hosts: &Hosts) -> SyncEngineConfig {
    SyncEngineConfig::builder()
        .tenant_config(hosts.tenants.clone())
        .client_resolver(hosts.resolver.clone())
        .poll_interval(Duration::from_millis(10))
        .retry_backoff(Duration::ZERO)
        .worker_id("worker-test")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_engine_runs_jobs_in_background() {
    let hosts = hosts();
    hosts.dam.put_asset(metadata("a1", &["promo"], 1));
    hosts.dam.put_asset(metadata("a2", &["promo"], 1));

    let engine = SyncEngine::bootstrap(config(&hosts)).await.unwrap();
    assert_eq!(engine.worker_id(), "worker-test");
    engine.health_check().await.unwrap();

    let worker = engine.start_worker();
    let service = engine.service();
    let job_id = service.create_pending_job("acme").await.unwrap();

    let mut job = service.get_job(&job_id).await.unwrap();
    for _ in 0..200 {
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        job = service.get_job(&job_id).await.unwrap();
    }

    assert_eq!(job.status, SyncStatus::Completed);
    assert_eq!(job.stats.assets_created, 2);
    assert_eq!(job.claimed_by.as_deref(), Some("worker-test"));
    assert_eq!(hosts.destination.upload_paths().len(), 2);

    worker.shutdown().await.unwrap();
    engine.close().await;
}

#[tokio::test]
async fn test_shutdown_token_stops_worker() {
    let hosts = hosts();
    let engine = SyncEngine::bootstrap(config(&hosts)).await.unwrap();

    let worker = engine.start_worker();
    assert!(!worker.is_finished());

    worker.shutdown_token().cancel();
    for _ in 0..200 {
        if worker.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(worker.is_finished());
    worker.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let hosts = hosts();
    let mut config = config(&hosts);
    config.burst_capacity = 0;

    let result = SyncEngine::bootstrap(config).await;
    assert!(matches!(result, Err(CoreError::InitializationFailed(_))));
}

#[test]
fn test_missing_capability_maps_to_core_error() {
    let hosts = hosts();
    let err = SyncEngineConfig::builder()
        .client_resolver(hosts.resolver.clone())
        .build()
        .unwrap_err();

    match CoreError::from(err) {
        CoreError::CapabilityMissing { capability, .. } => {
            assert_eq!(capability, "TenantConfigProvider")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_jobs_survive_restart_with_file_database() {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("dam-sync-{}-{}.db", std::process::id(), nanos));

    let hosts = hosts();
    let mut first = config(&hosts);
    first.database_path = Some(path.clone());
    let engine = SyncEngine::bootstrap(first).await.unwrap();
    let job_id = engine.service().create_pending_job("acme").await.unwrap();
    engine.close().await;

    let mut second = config(&hosts);
    second.database_path = Some(path.clone());
    let engine = SyncEngine::bootstrap(second).await.unwrap();
    let job = engine.service().get_job(&job_id).await.unwrap();
    assert_eq!(job.status, SyncStatus::Pending);
    engine.close().await;

    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}
