//! Distributed-store driver behaviour through the engine, backed by the
//! in-process store.

use std::time::Duration;

use bytes::Bytes;

use dynconf::config::{Rule, Settings};
use dynconf::driver::StoreDriverFactory;
use dynconf::store::KvStore;
use dynconf::{ConfigError, DriverRegistry, Engine, SourceConfig};

mod common;

use common::{recorder, registry, seeded_store, wait_until, Fixture};

const LOCATOR: &str = "etcd://127.0.0.1:2379";

fn seeded() -> std::sync::Arc<dynconf::store::MemoryStore> {
    seeded_store(&[
        ("/v1/foo", "demo1"),
        ("/v1/bar", "demo2"),
        ("/v1/port", " 8080 "),
        ("/v2/flag", "\"true\""),
    ])
}

#[tokio::test]
async fn test_preload_serves_from_cache() {
    let store = seeded();
    let mut settings = Settings::default();
    settings.store.preload = true;

    let sources = [SourceConfig::new(LOCATOR, vec![Rule::new("v1", "/v1/", false)])];
    let engine = Engine::new(&sources, &registry(&store, &settings)).await.unwrap();
    let reads = store.stats();

    assert_eq!(engine.string("v1", "foo").await.unwrap(), "demo1");
    assert_eq!(engine.get_raw_string("v1", "bar").await.unwrap(), "demo2");
    assert_eq!(engine.int("v1", "port").await.unwrap(), 8080);
    assert_eq!(store.stats(), reads);
}

#[tokio::test]
async fn test_missing_key_is_negatively_cached() {
    let store = seeded();
    let sources = [SourceConfig::new(LOCATOR, vec![Rule::new("v1", "/v1/", false)])];
    let engine = Engine::new(&sources, &registry(&store, &Settings::default()))
        .await
        .unwrap();

    for _ in 0..3 {
        assert!(engine.get_raw("v1", "missing").await.unwrap_err().is_not_found());
    }
    assert_eq!(store.stats().point_reads, 1);
}

#[tokio::test]
async fn test_put_fires_hook_and_delete_does_not() {
    let store = seeded();
    let sources = [SourceConfig::new(
        LOCATOR,
        vec![Rule::new("v1", "/v1/", true), Rule::new("v2", "/v2/", true)],
    )];
    let engine = Engine::new(&sources, &registry(&store, &Settings::default()))
        .await
        .unwrap();
    assert!(engine.bool("v2", "flag").await.unwrap());

    let (hook, seen) = recorder();
    assert!(engine.on_key_change_hook("v1", "foo", hook));

    store.put("/v1/foo", Bytes::from_static(b"demo10")).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || seen.lock().len() == 1).await);
    assert_eq!(engine.string("v1", "foo").await.unwrap(), "demo10");

    // same bytes again: no change, no call
    store.put("/v1/foo", Bytes::from_static(b"demo10")).await.unwrap();
    store.delete("/v1/foo").await.unwrap();
    let mut deleted = false;
    for _ in 0..200 {
        if let Err(ConfigError::NotFound) = engine.get_raw_string("v1", "foo").await {
            deleted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(deleted);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*seen.lock(), vec!["demo10"]);
}

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let store = seeded();
    let sources = [SourceConfig::new(LOCATOR, vec![Rule::new("v1", "/v1/", true)])];
    let engine = Engine::new(&sources, &registry(&store, &Settings::default()))
        .await
        .unwrap();

    let (hook, seen) = recorder();
    assert!(engine.on_key_change_hook("v1", "blob", hook));

    let value: Vec<u8> = (0u8..=255).collect();
    store.put("/v1/blob", Bytes::from(value.clone())).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || !seen.lock().is_empty()).await);

    assert_eq!(engine.get_raw("v1", "blob").await.unwrap(), value);
    assert_eq!(engine.get_raw_shared("v1", "blob").await.unwrap(), Bytes::from(value));
}

#[tokio::test]
async fn test_unwatched_prefix_rejects_hooks() {
    let store = seeded();
    let sources = [SourceConfig::new(
        LOCATOR,
        vec![Rule::new("v1", "/v1/", false), Rule::new("v2", "/v2/", true)],
    )];
    let engine = Engine::new(&sources, &registry(&store, &Settings::default()))
        .await
        .unwrap();

    let (hook, _) = recorder();
    assert!(!engine.on_key_change_hook("v1", "foo", hook.clone()));
    assert!(!engine.on_key_change_hook("nowhere", "foo", hook.clone()));
    assert!(engine.on_key_change_hook("v2", "flag", hook));
}

#[tokio::test]
async fn test_duplicate_namespace_rolls_back() {
    let store = seeded();
    let fixture = Fixture::new();
    fixture.write("app.yaml", "foo: file\n");

    let settings = Settings::default();
    let mut registry = registry(&store, &settings);
    registry.register(
        "etcd",
        StoreDriverFactory::with_store(store.clone(), settings.store.clone()).close_shared_store(),
    );

    let sources = [
        SourceConfig::new(LOCATOR, vec![Rule::new("app|v1", "/v1/", true)]),
        SourceConfig::new(fixture.locator(), vec![Rule::new("app", "app.yaml", false)]),
    ];

    match Engine::new(&sources, &registry).await {
        Err(ConfigError::DuplicateNamespace(ns)) => assert_eq!(ns, "app"),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("duplicate namespace accepted"),
    }
    assert!(store.is_closed());
}

#[tokio::test]
async fn test_descriptor_from_store() {
    let fixture = Fixture::new();
    fixture.write("app.yaml", "name: from-file\n");

    let meta = format!(
        r#"[{{"source": "{}", "configs": [{{"namespace": "app", "path": "app.yaml"}}]}},
            {{"source": "{LOCATOR}", "configs": [{{"namespace": "v1", "path": "/v1/"}}]}}]"#,
        fixture.locator()
    );
    let store = seeded();
    store.put("/meta/sources", Bytes::from(meta)).await.unwrap();

    let registry = registry(&store, &Settings::default());
    let engine = Engine::from_store(&*store, "/meta/sources", "json", &registry)
        .await
        .unwrap();
    assert_eq!(engine.namespaces(), vec!["app", "v1"]);
    assert_eq!(engine.string("app", "name").await.unwrap(), "from-file");
    assert_eq!(engine.string("v1", "foo").await.unwrap(), "demo1");

    let missing = Engine::from_store(&*store, "/meta/none", "json", &registry).await;
    assert!(matches!(missing, Err(ConfigError::NotFound)));
}

#[tokio::test]
async fn test_unknown_scheme_closes_opened_drivers() {
    let store = seeded();
    let settings = Settings::default();
    let mut registry = DriverRegistry::new();
    registry.register(
        "etcd",
        StoreDriverFactory::with_store(store.clone(), settings.store.clone()).close_shared_store(),
    );

    let sources = [
        SourceConfig::new(LOCATOR, vec![Rule::new("v1", "/v1/", false)]),
        SourceConfig::new("consul://x", vec![Rule::new("c", "/c/", false)]),
    ];
    assert!(matches!(
        Engine::new(&sources, &registry).await,
        Err(ConfigError::UnknownScheme(s)) if s == "consul"
    ));
    assert!(store.is_closed());
}
