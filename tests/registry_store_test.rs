use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use svc_orchestrator::{
    Config, RegisterRequest, RegistryError, RegistryStore, RelocationPolicy, ServiceRegistry,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_register_and_get_services_scenario() {
    init_tracing();
    let store = RegistryStore::default();

    for (service, registrant) in [("svcA", "r1"), ("svcA", "r2"), ("svcB", "r3")] {
        let response = store
            .register(&RegisterRequest::new(service, registrant))
            .expect("Registration should succeed");
        assert_eq!(response.service_name, service);
        assert_eq!(response.registrant, registrant);
    }

    let snapshot = store.get_services().expect("Snapshot should succeed");
    let infos = snapshot.to_service_infos();

    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].service_name, "svcA");
    assert_eq!(infos[0].registrants, vec!["r1", "r2"]);
    assert_eq!(infos[1].service_name, "svcB");
    assert_eq!(infos[1].registrants, vec!["r3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_registrations_same_service() {
    init_tracing();
    let store = Arc::new(RegistryStore::default());

    // 100 个任务同时向同一个服务注册不同实例
    let mut handles = Vec::new();
    for i in 0..100 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.register(&RegisterRequest::new("svcA", format!("sidecar-{i}")))
        }));
    }

    for handle in handles {
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("Timeout waiting for registration")
            .expect("Registration task panicked")
            .expect("Registration failed");
    }

    let snapshot = store.get_services().expect("Snapshot should succeed");
    let registrants: HashSet<&str> = snapshot.registrant_ids("svcA").into_iter().collect();
    assert_eq!(registrants.len(), 100);
    assert_eq!(snapshot.registrant_count(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_registrations_many_services_no_loss_or_duplication() {
    init_tracing();
    let store = Arc::new(RegistryStore::default());

    // 每个实例重复注册两次，验证幂等
    let mut handles = Vec::new();
    for i in 0..200 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let request = RegisterRequest::new(format!("svc-{}", i % 10), format!("r-{i}"));
            store.register(&request)?;
            store.register(&request)
        }));
    }
    for handle in handles {
        handle
            .await
            .expect("Registration task panicked")
            .expect("Registration failed");
    }

    let snapshot = store.get_services().expect("Snapshot should succeed");
    assert_eq!(snapshot.len(), 10);
    assert_eq!(snapshot.registrant_count(), 200);
    for (service_name, registrants) in snapshot.iter() {
        assert_eq!(registrants.len(), 20);
        for registrant in registrants {
            assert_eq!(registrant.service_name, service_name);
            let index: usize = registrant.id["r-".len()..].parse().expect("numeric suffix");
            assert_eq!(format!("svc-{}", index % 10), service_name);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshots_never_see_moved_registrant_twice() {
    init_tracing();
    let store = Arc::new(RegistryStore::new(RelocationPolicy::Move));
    store
        .register(&RegisterRequest::new("blue", "sidecar-1"))
        .expect("Initial registration should succeed");

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for round in 0..500 {
                let service = if round % 2 == 0 { "green" } else { "blue" };
                store
                    .register(&RegisterRequest::new(service, "sidecar-1"))
                    .expect("Move should succeed");
            }
        })
    };

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..500 {
                let snapshot = store.get_services().expect("Snapshot should succeed");
                // 任意时刻实例只属于一个服务
                assert_eq!(snapshot.registrant_count(), 1);
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.expect("Writer task panicked");
    reader.await.expect("Reader task panicked");
}

#[tokio::test]
async fn test_invalid_input_is_rejected() {
    let store = RegistryStore::default();

    let err = store
        .register(&RegisterRequest::new("", "r1"))
        .expect_err("Empty service name must fail");
    assert!(matches!(err, RegistryError::InvalidInput(_)));

    let err = store
        .register(&RegisterRequest::new("svcA", ""))
        .expect_err("Empty registrant must fail");
    assert!(matches!(err, RegistryError::InvalidInput(_)));
    assert!(err.is_client_error());

    assert!(store.get_services().expect("Snapshot should succeed").is_empty());
}

#[tokio::test]
async fn test_store_from_config_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[registry]\nrelocation = \"move\"\n").expect("Failed to write config");

    let config = Config::load(&path).expect("Config should load");
    let store = RegistryStore::from_config(&config);
    assert_eq!(store.relocation_policy(), RelocationPolicy::Move);

    store
        .register(&RegisterRequest::new("svcA", "r1"))
        .expect("Registration should succeed");
    store
        .register(&RegisterRequest::new("svcB", "r1"))
        .expect("Move should succeed");
    assert_eq!(
        store
            .get_services()
            .expect("Snapshot should succeed")
            .registrant_ids("svcB"),
        vec!["r1"]
    );
}

#[test]
fn test_missing_config_file_is_reported() {
    let result = Config::load("/nonexistent/orchestrator.toml");
    assert!(result.is_err());
}

#[test]
fn test_trait_object_usage() {
    // HTTP 层只依赖 trait
    let registry: Arc<dyn ServiceRegistry> = Arc::new(RegistryStore::default());
    registry
        .register(&RegisterRequest::new("svcA", "r1"))
        .expect("Registration should succeed");

    let snapshot = registry.get_services().expect("Snapshot should succeed");
    assert_eq!(snapshot.registrant_ids("svcA"), vec!["r1"]);
}
