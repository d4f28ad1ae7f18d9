//! Struct binding against live drivers: eager fields, lazy slots and
//! hot-swapped watched slots.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;

use dynconf::binder::{Bind, Binder, Bindings, Watched};
use dynconf::config::{Rule, Settings};
use dynconf::store::{KvStore, MemoryStore};
use dynconf::{ConfigError, Engine, LazyTable, SourceConfig};

mod common;

use common::{registry, seeded_store, wait_until, Fixture};

#[derive(Debug, Deserialize, PartialEq)]
struct Pool {
    size: u32,
    /// Always equal to `size`; a torn read would break this.
    check: u32,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Db {
    host: String,
    port: u16,
}

#[derive(Default)]
struct AppConfig {
    name: String,
    port: u16,
    pool: Watched<Pool>,
    db: Watched<Db>,
}

impl Bind for AppConfig {
    fn bindings<'a>(&'a mut self, b: &mut Bindings<'a>) {
        b.field("name", "namespace:app;key:name", &mut self.name)
            .field("port", "namespace:app;key:port", &mut self.port)
            .slot("pool", "namespace:live;key:pool;format:json;watch:true", &self.pool)
            .slot("db", "namespace:app;key:db;lazy:true", &self.db);
    }
}

async fn engine(store: &Arc<MemoryStore>, fixture: &Fixture) -> Arc<Engine> {
    fixture.write(
        "app.yaml",
        "name: demo\nport: 8080\ndb:\n  host: db.local\n  port: 5432\n",
    );
    let sources = [
        SourceConfig::new(fixture.locator(), vec![Rule::new("app", "app.yaml", false)]),
        SourceConfig::new("etcd://local", vec![Rule::new("live", "/live/", true)]),
    ];
    let engine = Engine::new(&sources, &registry(store, &Settings::default()))
        .await
        .unwrap();
    Arc::new(engine)
}

fn pool_store() -> Arc<MemoryStore> {
    seeded_store(&[("/live/pool", r#"{"size": 1, "check": 1}"#)])
}

#[tokio::test]
async fn test_bind_loads_eager_and_defers_lazy() {
    let store = pool_store();
    let fixture = Fixture::new();
    let engine = engine(&store, &fixture).await;

    let mut cfg = AppConfig::default();
    let lazy = Binder::new(engine).bind(&mut cfg).await.unwrap();

    assert_eq!(cfg.name, "demo");
    assert_eq!(cfg.port, 8080);
    assert_eq!(*cfg.pool.load().unwrap(), Pool { size: 1, check: 1 });

    assert!(!cfg.db.is_loaded());
    assert_eq!(lazy.len(), 1);
    assert!(lazy.contains(cfg.db.token()));

    let db = lazy.try_load(&cfg.db).await.unwrap();
    assert_eq!(db.host, "db.local");
    assert_eq!(db.port, 5432);
    assert!(Arc::ptr_eq(&db, &lazy.try_load(&cfg.db).await.unwrap()));
}

#[tokio::test]
async fn test_try_load_without_loader_is_not_found() {
    let table = LazyTable::default();
    let slot: Watched<Db> = Watched::new();
    assert!(matches!(table.try_load(&slot).await, Err(ConfigError::NotFound)));

    slot.store(Arc::new(Db {
        host: "h".into(),
        port: 1,
    }));
    assert_eq!(table.try_load(&slot).await.unwrap().host, "h");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_watched_slot_swaps_whole_values() {
    let store = pool_store();
    let fixture = Fixture::new();
    let engine = engine(&store, &fixture).await;

    let mut cfg = AppConfig::default();
    Binder::new(engine).bind(&mut cfg).await.unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicUsize::new(0));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let pool = cfg.pool.clone();
            let stop = stop.clone();
            let reads = reads.clone();
            tokio::spawn(async move {
                while !stop.load(Ordering::Relaxed) {
                    let current = pool.load().unwrap();
                    assert_eq!(current.size, current.check);
                    reads.fetch_add(1, Ordering::Relaxed);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for i in 2..=50u32 {
        let value = format!(r#"{{"size": {i}, "check": {i}}}"#);
        store.put("/live/pool", Bytes::from(value)).await.unwrap();
    }

    let pool = cfg.pool.clone();
    assert!(wait_until(Duration::from_secs(5), || pool.load().unwrap().size == 50).await);

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.await.unwrap();
    }
    assert!(reads.load(Ordering::Relaxed) > 0);
}

#[tokio::test]
async fn test_rejected_update_keeps_current_value() {
    let store = pool_store();
    let fixture = Fixture::new();
    let engine = engine(&store, &fixture).await;

    let mut cfg = AppConfig::default();
    Binder::new(engine).bind(&mut cfg).await.unwrap();

    store.put("/live/pool", Bytes::from_static(b"not json")).await.unwrap();
    store
        .put("/live/pool", Bytes::from_static(br#"{"size": 9, "check": 9}"#))
        .await
        .unwrap();

    let pool = cfg.pool.clone();
    assert!(wait_until(Duration::from_secs(2), || pool.load().unwrap().size == 9).await);
}

struct Unwatchable {
    db: Watched<Db>,
}

impl Bind for Unwatchable {
    fn bindings<'a>(&'a mut self, b: &mut Bindings<'a>) {
        b.slot("db", "namespace:app;key:db;watch:true", &self.db);
    }
}

#[tokio::test]
async fn test_watch_on_static_source_fails() {
    let store = pool_store();
    let fixture = Fixture::new();
    let engine = engine(&store, &fixture).await;

    let mut cfg = Unwatchable { db: Watched::new() };
    let err = Binder::new(engine).bind(&mut cfg).await.unwrap_err();

    match err {
        ConfigError::Field { field, source } => {
            assert_eq!(field, "db");
            assert!(matches!(*source, ConfigError::NotWatchable { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

struct BadTags {
    a: u32,
    b: u32,
    c: u32,
}

impl Bind for BadTags {
    fn bindings<'a>(&'a mut self, b: &mut Bindings<'a>) {
        b.field("a", "namespace:app;key:port", &mut self.a)
            .field("b", "namespace:app;key:port;format:ini", &mut self.b)
            .field("c", "key:port", &mut self.c);
    }
}

#[tokio::test]
async fn test_bind_stops_at_first_bad_field() {
    let store = pool_store();
    let fixture = Fixture::new();
    let engine = engine(&store, &fixture).await;

    let mut cfg = BadTags { a: 0, b: 0, c: 0 };
    let err = Binder::new(engine).bind(&mut cfg).await.unwrap_err();

    assert!(matches!(
        err,
        ConfigError::Field { ref field, ref source }
            if field == "b" && matches!(**source, ConfigError::UnsupportedFormat(_))
    ));
    assert_eq!(cfg.a, 8080);
    assert_eq!(cfg.c, 0);
}

#[tokio::test]
async fn test_missing_key_fails_bind() {
    let store = Arc::new(MemoryStore::new());
    let fixture = Fixture::new();
    let engine = engine(&store, &fixture).await;

    let mut cfg = AppConfig::default();
    let err = Binder::new(engine).bind(&mut cfg).await.unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Field { ref field, ref source } if field == "pool" && source.is_not_found()
    ));
}

#[derive(Default)]
struct Versioned {
    version: String,
    label: Watched<String>,
}

impl Bind for Versioned {
    fn bindings<'a>(&'a mut self, b: &mut Bindings<'a>) {
        b.field("version", "namespace:svc;key:version", &mut self.version)
            .slot("label", "namespace:svc;key:label", &self.label);
    }
}

#[tokio::test]
async fn test_quoted_yaml_strings_bind_as_strings() {
    let fixture = Fixture::new();
    fixture.write("svc.yaml", "version: \"1.0\"\nlabel: '  café  '\n");
    let sources = [SourceConfig::new(
        fixture.locator(),
        vec![Rule::new("svc", "svc.yaml", false)],
    )];
    let engine = Engine::new(&sources, &registry(&pool_store(), &Settings::default()))
        .await
        .unwrap();

    let mut cfg = Versioned::default();
    Binder::new(Arc::new(engine)).bind(&mut cfg).await.unwrap();

    assert_eq!(cfg.version, "1.0");
    assert_eq!(*cfg.label.load().unwrap(), "  café  ");
}
