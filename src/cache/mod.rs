// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batched access to the key-value service.
//!
//! [`Cache`] is a cheap-to-clone handle over a shared transport. On top of
//! plain `get`/`set` it offers:
//!
//! - [`Cache::pipe_get`]: one pipelined round trip for many keys, split into
//!   hits and misses
//! - [`Cache::batch_get`]: the same, sharded and fetched concurrently
//! - [`Cache::batch_save`] / [`BatchWriter`]: pipelined writes flushed in
//!   chunks of [`BATCH_SAVE_CHUNK_BYTES`]
//! - [`SingleFlight`]: collapses concurrent reads of one key into one fetch
//!
//! None of these set their own timeout. Wrap calls in
//! `tokio::time::timeout` to bound them; dropping the future cancels it.

mod batch;
mod single_flight;

pub use batch::{BatchSaveResult, BatchWriter, SaveValue, BATCH_SAVE_CHUNK_BYTES};
pub use single_flight::SingleFlight;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use crate::config::CacheConfig;
use crate::prefix::{Prefix, PrefixedTransport};
use crate::resilience::retry::RetryConfig;
use crate::transport::{CacheError, Command, KvTransport, RedisTransport};

/// Handle over a shared transport.
///
/// Carries the shard size and write expiration used by
/// [`batch_get_default`](Self::batch_get_default) and
/// [`batch_writer_default`](Self::batch_writer_default).
#[derive(Clone)]
pub struct Cache {
    transport: Arc<dyn KvTransport>,
    shot_limit: usize,
    default_expiration: Duration,
}

impl Cache {
    pub fn new<T: KvTransport + 'static>(transport: T) -> Self {
        Self::from_shared(Arc::new(transport))
    }

    pub fn from_shared(transport: Arc<dyn KvTransport>) -> Self {
        let defaults = CacheConfig::default();
        Self {
            transport,
            shot_limit: defaults.shot_limit,
            default_expiration: defaults.default_expiration(),
        }
    }

    /// Take the shard size and default expiration from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &CacheConfig) -> Self {
        self.shot_limit = config.shot_limit;
        self.default_expiration = config.default_expiration();
        self
    }

    /// Connect to Redis per `config`, installing the prefix hook when a
    /// non-empty `key_prefix` is configured.
    #[instrument(skip(config), fields(prefix = ?config.key_prefix))]
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let retry = RetryConfig { max_attempts: config.connect_attempts, ..RetryConfig::startup() };
        let redis = RedisTransport::connect_with(&config.redis_url, &retry).await?;

        let prefix = config.key_prefix.as_deref().map(Prefix::new).filter(|p| !p.is_empty());
        let cache = match prefix {
            Some(prefix) => {
                info!(prefix = %prefix, "cache connected with key prefix");
                Self::new(PrefixedTransport::new(redis, prefix))
            }
            None => {
                info!("cache connected");
                Self::new(redis)
            }
        };
        Ok(cache.with_config(config))
    }

    pub fn shot_limit(&self) -> usize {
        self.shot_limit
    }

    pub fn default_expiration(&self) -> Duration {
        self.default_expiration
    }

    pub fn transport(&self) -> &Arc<dyn KvTransport> {
        &self.transport
    }

    /// `GET key`; `None` when the key does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.transport.exec(Command::get(key)).await?.into_string()
    }

    /// `SET key value`, expiring after `expiration` unless it is zero.
    pub async fn set(&self, key: &str, value: &str, expiration: Duration) -> Result<(), CacheError> {
        self.transport.exec(Command::set(key, value, expiration)).await?.expect_ok()
    }

    /// `DEL key...`; returns how many keys existed.
    pub async fn del(&self, keys: &[&str]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let cmd = keys.iter().fold(Command::new("DEL"), |cmd, k| cmd.arg(*k));
        match self.transport.exec(cmd).await? {
            crate::transport::Value::Int(n) => Ok(n.max(0) as u64),
            other => Err(CacheError::Type { expected: "integer", found: format!("{:?}", other) }),
        }
    }

    /// A deduplicating reader sharing this cache's transport.
    pub fn single_flight(&self) -> SingleFlight {
        SingleFlight::new(self.clone())
    }
}
