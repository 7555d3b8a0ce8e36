// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic memstore usage example.
//!
//! Demonstrates:
//! 1. Building cache keys from a named-placeholder schema
//! 2. Filling an in-memory store and saving it through the cache dumper
//! 3. Loading the saved state into a second store
//! 4. Batched and single-flight reads
//! 5. Displaying metrics
//!
//! Runs against an in-process backend. Set `REDIS_URL` to use Redis instead:
//!
//! ```bash
//! cargo run --example basic_usage
//! REDIS_URL=redis://localhost:6379 cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use memstore::{
    key_params, Cache, CacheConfig, CacheDumper, InMemoryStore, KeySchema, MemoryTransport, PrefixedTransport,
    Storable, Storage, StoreError,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Pocket {
    name: String,
    coins: u64,
}

impl Storable for Pocket {
    fn store_name(&self) -> String {
        self.name.clone()
    }
}

struct PocketKey {
    account_id: u64,
    name: String,
}

key_params!(PocketKey { account_id, name });

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║              memstore: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Key schema
    // ─────────────────────────────────────────────────────────────────────────
    let schema = KeySchema::<PocketKey>::new("pockets:{account_id}:{name}", Duration::from_secs(600))?;
    let key = schema.build(&PocketKey { account_id: 42, name: "main".into() });
    println!("🔑 Schema {} → {} (exp {:?})", schema.template(), key, schema.exp());
    println!("   └─ positional form: {}", schema.to_format());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Cache, namespaced under "demo"
    // ─────────────────────────────────────────────────────────────────────────
    let config = CacheConfig {
        redis_url: std::env::var("REDIS_URL").unwrap_or_default(),
        key_prefix: Some("demo".into()),
        shot_limit: 3,
        ..Default::default()
    };
    let cache = if config.redis_url.is_empty() {
        println!("\n📦 Using the in-process backend");
        Cache::new(PrefixedTransport::new(MemoryTransport::new(), "demo")).with_config(&config)
    } else {
        println!("\n📦 Connecting to {}...", config.redis_url);
        Cache::connect(&config).await?
    };
    let dumper = Arc::new(CacheDumper::<Pocket>::new(cache.clone()));

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Fill and save a store
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Filling store 'pockets'...");
    let store = InMemoryStore::<Pocket>::new("pockets").with_dumper(dumper.clone());
    for player in 1..=5 {
        let owner = format!("player-{}", player);
        store.set(&owner, Pocket { name: "main".into(), coins: player * 10 }).await?;
        store
            .update::<_, StoreError>(&owner, "bank", |bank| {
                let mut bank = bank.cloned().unwrap_or_else(|| Pocket { name: "bank".into(), coins: 0 });
                bank.coins += 100;
                Ok(Some(bank))
            })
            .await?;
    }
    println!("   └─ dirty: {}", store.is_dirty().await);

    let start = Instant::now();
    store.save().await?;
    println!("   ✅ Saved in {:?}, dirty: {}", start.elapsed(), store.is_dirty().await);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Load into a second store
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Loading into a fresh store...");
    let replica = InMemoryStore::<Pocket>::new("pockets").with_dumper(dumper.clone());
    replica.load().await?;
    let mut out = Pocket { name: "bank".into(), ..Default::default() };
    replica.get("player-3", &mut out).await?;
    println!("   └─ player-3 owns {:?}", replica.list("player-3").await?);
    println!("   └─ player-3 bank: {} coins", out.coins);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Batched and single-flight reads
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔍 Batched reads...");
    let keys: Vec<String> = (1..=7).map(|p| dumper.bucket_key("pockets", &format!("player-{}", p))).collect();
    let (hits, misses) = cache.batch_get_default(&keys).await?;
    println!("   └─ shards of {}", cache.shot_limit());
    println!("   └─ {} hits, misses: {:?}", hits.len(), misses);

    let sf = cache.single_flight();
    let index_key = dumper.bucket_key("pockets", "__index");
    let reads = futures::future::join_all((0..10).map(|_| sf.get(&index_key))).await;
    println!("   └─ 10 concurrent reads of the index, first: {:?}", reads[0]);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    println!("\n✅ Done!\n");
    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        let rendered = match value {
            DebugValue::Counter(v) => format!("{}", v),
            DebugValue::Gauge(v) => format!("{}", v.into_inner()),
            DebugValue::Histogram(samples) => {
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                format!("count={} sum={:.4}", samples.len(), sum)
            }
        };
        lines.push(format!("{}{} = {}", key.name(), label_str, rendered));
    }

    lines.sort();
    for line in lines {
        println!("   └─ {}", line);
    }
}
