//! # memstore
//!
//! Per-owner resource storage held in memory and externalized in bulk to a
//! Redis-compatible key-value service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    InMemoryStore<T>                         │
//! │  • owner → resource name → resource                        │
//! │  • dirty flag, atomic update, save / load                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     (Dumper: whole-store save/load)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Cache                                │
//! │  • pipe_get / batch_get (sharded, concurrent)              │
//! │  • batch_save in 512 KiB pipeline chunks                   │
//! │  • single-flight reads                                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (PrefixedTransport: key namespacing)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              KvTransport: Redis or in-memory               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use memstore::{CacheConfig, CacheDumper, InMemoryStore, Storable, Storage};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Pocket {
//!     name: String,
//!     coins: u64,
//! }
//!
//! impl Storable for Pocket {
//!     fn store_name(&self) -> String {
//!         self.name.clone()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CacheConfig {
//!         redis_url: "redis://localhost:6379".into(),
//!         key_prefix: Some("game".into()),
//!         ..Default::default()
//!     };
//!     let dumper = CacheDumper::<Pocket>::connect(&config).await.expect("redis");
//!     let store = InMemoryStore::<Pocket>::new("pockets").with_dumper(Arc::new(dumper));
//!
//!     store.set("player-1", Pocket { name: "main".into(), coins: 10 }).await.unwrap();
//!     store
//!         .update::<_, memstore::StoreError>("player-1", "main", |p| {
//!             let mut p = p.cloned().unwrap_or_default();
//!             p.coins += 5;
//!             Ok(Some(p))
//!         })
//!         .await
//!         .unwrap();
//!
//!     store.save().await.unwrap();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`store`]: the resource store and the [`Dumper`] contract
//! - [`dumper`]: [`CacheDumper`], persisting a store through the cache
//! - [`cache`]: batched reads and writes, single-flight
//! - [`prefix`]: key namespacing of outgoing commands
//! - [`keyschema`]: named-placeholder key templates
//! - [`transport`]: the key-value service seam, Redis and in-memory
//! - [`resilience`]: connection retry

pub mod cache;
pub mod config;
pub mod dumper;
pub mod keyschema;
pub mod metrics;
pub mod prefix;
pub mod resilience;
pub mod store;
pub mod transport;

pub use cache::{BatchSaveResult, BatchWriter, Cache, SaveValue, SingleFlight, BATCH_SAVE_CHUNK_BYTES};
pub use config::CacheConfig;
pub use dumper::CacheDumper;
pub use keyschema::{KeyFormat, KeyParams, KeySchema, KeySchemaError};
pub use metrics::LatencyTimer;
pub use prefix::{KeyLayout, Prefix, PrefixedTransport};
pub use resilience::retry::RetryConfig;
pub use store::{DataMap, Dumper, InMemoryStore, Storable, Storage, StoreError, Uid};
pub use transport::{Arg, CacheError, Command, KvTransport, MemoryTransport, RedisTransport, Value};
