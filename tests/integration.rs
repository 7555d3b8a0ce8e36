//! Integration Tests for memstore
//!
//! Tests that need a real Redis. Containers come from testcontainers, so no
//! external docker-compose is required.
//!
//! # Running Tests
//! ```bash
//! # Run all integration tests (requires Docker)
//! cargo test --test integration -- --ignored
//! ```
//!
//! # Test Organization
//! - `happy_*` - round trips through Redis
//! - `failure_*` - unreachable or emptied backends

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use memstore::{
    Cache, CacheConfig, CacheDumper, CacheError, Command, InMemoryStore, KvTransport, RedisTransport, RetryConfig,
    SaveValue, Storable, Storage, StoreError,
};

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

// =============================================================================
// Helpers
// =============================================================================

/// Create a Redis container with health check
fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

fn redis_config(port: u16, prefix: Option<&str>) -> CacheConfig {
    CacheConfig {
        redis_url: format!("redis://127.0.0.1:{}", port),
        key_prefix: prefix.map(String::from),
        ..Default::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Pocket {
    name: String,
    coins: u64,
}

impl Storable for Pocket {
    fn store_name(&self) -> String {
        self.name.clone()
    }
}

fn pocket(name: &str, coins: u64) -> Pocket {
    Pocket { name: name.into(), coins }
}

// =============================================================================
// Happy Path Tests
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_store_round_trip_through_redis() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let config = redis_config(redis.get_host_port_ipv4(6379), None);

    let dumper = Arc::new(CacheDumper::<Pocket>::connect(&config).await.expect("connect"));

    let first = InMemoryStore::<Pocket>::new("pockets").with_dumper(dumper.clone());
    for owner in 0..50 {
        let owner = format!("player-{}", owner);
        first.set(&owner, pocket("main", 10)).await.unwrap();
        first.set(&owner, pocket("bank", 1000)).await.unwrap();
    }
    first.save().await.expect("save");
    assert!(!first.is_dirty().await);

    let second = InMemoryStore::<Pocket>::new("pockets").with_dumper(dumper.clone());
    second.load().await.expect("load");
    assert_eq!(second.owner_count().await, 50);

    let mut out = pocket("bank", 0);
    second.get("player-42", &mut out).await.unwrap();
    assert_eq!(out, pocket("bank", 1000));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_batch_save_then_pipe_get() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = Cache::connect(&redis_config(redis.get_host_port_ipv4(6379), None)).await.unwrap();

    let entries = vec![
        ("uid001", SaveValue::from("res001")),
        ("uid002", SaveValue::from("res002")),
        ("uid003", SaveValue::from("res003")),
        ("uid004", SaveValue::Json(serde_json::json!(1))),
        ("uid005", SaveValue::Json(serde_json::json!({"Name": "res005"}))),
    ];
    cache.batch_save(entries, Duration::ZERO).await.unwrap();

    let keys = ["uid001", "uid002", "uid003", "uid004", "uid005", "uidAAA"];
    let (hits, misses) = cache.pipe_get(&keys).await.unwrap();
    assert_eq!(hits, vec!["res001", "res002", "res003", "1", "{\"Name\":\"res005\"}"]);
    assert_eq!(misses, vec!["uidAAA"]);

    let (mut hits, misses) = cache.batch_get(2, &keys).await.unwrap();
    hits.sort();
    assert_eq!(hits.len(), 5);
    assert_eq!(misses, vec!["uidAAA"]);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_large_batch_save_spans_chunks() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = Cache::connect(&redis_config(redis.get_host_port_ipv4(6379), None)).await.unwrap();

    let blob = "z".repeat(64 * 1024);
    let entries = (0..40).map(|i| (format!("blob:{}", i), SaveValue::Raw(blob.clone())));
    let result = cache.batch_save(entries, Duration::from_secs(60)).await.unwrap();

    assert_eq!(result.written, 40);
    assert!(result.flushes >= 5);

    let keys: Vec<String> = (0..40).map(|i| format!("blob:{}", i)).collect();
    let (hits, misses) = cache.batch_get(7, &keys).await.unwrap();
    assert_eq!(hits.len(), 40);
    assert!(misses.is_empty());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_prefixes_isolate_stores() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let a = Arc::new(CacheDumper::<Pocket>::connect(&redis_config(port, Some("tenant-a"))).await.unwrap());
    let b = Arc::new(CacheDumper::<Pocket>::connect(&redis_config(port, Some("tenant-b:"))).await.unwrap());

    let store_a = InMemoryStore::<Pocket>::new("pockets").with_dumper(a.clone());
    store_a.set("p1", pocket("main", 1)).await.unwrap();
    store_a.save().await.unwrap();

    let store_b = InMemoryStore::<Pocket>::new("pockets").with_dumper(b.clone());
    store_b.set("p1", pocket("main", 2)).await.unwrap();
    store_b.save().await.unwrap();

    // Raw keys carry the namespace.
    let raw = RedisTransport::connect(&format!("redis://127.0.0.1:{}", port)).await.unwrap();
    let found = raw.exec(Command::new("EXISTS").arg("tenant-a:store:pockets:p1").arg("tenant-b:store:pockets:p1")).await.unwrap();
    assert_eq!(found, memstore::Value::Int(2));

    let reload_a = InMemoryStore::<Pocket>::new("pockets").with_dumper(a);
    reload_a.load().await.unwrap();
    let mut out = pocket("main", 0);
    reload_a.get("p1", &mut out).await.unwrap();
    assert_eq!(out.coins, 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_single_flight_against_redis() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = Cache::connect(&redis_config(redis.get_host_port_ipv4(6379), None)).await.unwrap();
    cache.set("hot", "value", Duration::ZERO).await.unwrap();

    let sf = cache.single_flight();
    let results = futures::future::join_all((0..20).map(|_| sf.get("hot"))).await;
    for r in results {
        assert_eq!(r.unwrap().as_deref(), Some("value"));
    }

    // The server rejects GET of a hash.
    raw_hset(&cache).await;
    assert!(matches!(sf.get("h").await, Err(CacheError::Backend(_))));
}

async fn raw_hset(cache: &Cache) {
    cache
        .transport()
        .exec(Command::new("HSET").arg("h").arg("f").arg("v"))
        .await
        .unwrap();
}

// =============================================================================
// Failure Scenario Tests
// =============================================================================

#[tokio::test]
async fn failure_unreachable_redis_gives_up() {
    let config = CacheConfig {
        redis_url: "redis://127.0.0.1:1".into(),
        connect_attempts: 1,
        ..Default::default()
    };
    let err = Cache::connect(&config).await.err().expect("connect must fail");
    assert!(matches!(err, CacheError::Backend(_)));

    let retry = RetryConfig::once();
    assert!(RedisTransport::connect_with("redis://127.0.0.1:1", &retry).await.is_err());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_load_after_flush_reports_missing_index() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let config = redis_config(redis.get_host_port_ipv4(6379), None);
    let dumper = Arc::new(CacheDumper::<Pocket>::connect(&config).await.unwrap());

    let store = InMemoryStore::<Pocket>::new("pockets").with_dumper(dumper.clone());
    store.set("p1", pocket("main", 1)).await.unwrap();
    store.save().await.unwrap();

    dumper.cache().transport().exec(Command::new("FLUSHDB")).await.unwrap();

    let fresh = InMemoryStore::<Pocket>::new("pockets").with_dumper(dumper);
    let err = fresh.load().await.unwrap_err();
    assert!(matches!(err, StoreError::Load(CacheError::NotFound(_))));
    assert_eq!(fresh.owner_count().await, 0);
}
