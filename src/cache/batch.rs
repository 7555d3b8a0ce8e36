use std::mem;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use super::Cache;
use crate::metrics;
use crate::transport::{CacheError, Command};

/// Staged `key + value` bytes that trigger a pipeline flush once exceeded.
pub const BATCH_SAVE_CHUNK_BYTES: usize = 512 * 1024;

/// A value handed to a batch save, with its encoding chosen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveValue {
    /// Written verbatim.
    Raw(String),
    /// Serialized to JSON text before writing.
    Json(serde_json::Value),
}

impl SaveValue {
    /// Capture any serializable value as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, CacheError> {
        serde_json::to_value(value)
            .map(SaveValue::Json)
            .map_err(|e| CacheError::Encode { key: String::new(), reason: e.to_string() })
    }

    fn encode(self, key: &str) -> Result<String, CacheError> {
        match self {
            SaveValue::Raw(s) => Ok(s),
            SaveValue::Json(v) => serde_json::to_string(&v)
                .map_err(|e| CacheError::Encode { key: key.to_string(), reason: e.to_string() }),
        }
    }
}

impl From<String> for SaveValue {
    fn from(s: String) -> Self {
        SaveValue::Raw(s)
    }
}

impl From<&str> for SaveValue {
    fn from(s: &str) -> Self {
        SaveValue::Raw(s.to_string())
    }
}

impl From<serde_json::Value> for SaveValue {
    fn from(v: serde_json::Value) -> Self {
        SaveValue::Json(v)
    }
}

/// Totals of a completed batch save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSaveResult {
    /// Number of `SET`s sent
    pub written: usize,
    /// Number of pipelines submitted
    pub flushes: usize,
    /// Sum of `key + value` lengths sent
    pub bytes: usize,
}

/// Push-style sink for a batch save.
///
/// Each [`write`](Self::write) stages one `SET`; when the staged bytes pass
/// [`BATCH_SAVE_CHUNK_BYTES`] the pipeline is sent and awaited before the
/// call returns. [`finish`](Self::finish) sends the remainder. Chunks already
/// sent stay written if a later one fails.
pub struct BatchWriter<'a> {
    cache: &'a Cache,
    expiration: Duration,
    pending: Vec<Command>,
    pending_bytes: usize,
    result: BatchSaveResult,
}

impl<'a> BatchWriter<'a> {
    fn new(cache: &'a Cache, expiration: Duration) -> Self {
        Self {
            cache,
            expiration,
            pending: Vec::new(),
            pending_bytes: 0,
            result: BatchSaveResult::default(),
        }
    }

    pub async fn write(&mut self, key: impl Into<String>, value: impl Into<SaveValue>) -> Result<(), CacheError> {
        let key = key.into();
        let encoded = value.into().encode(&key)?;

        self.pending_bytes += key.len() + encoded.len();
        self.pending.push(Command::set(key, encoded, self.expiration));

        if self.pending_bytes > BATCH_SAVE_CHUNK_BYTES {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send the remaining staged commands.
    pub async fn finish(mut self) -> Result<BatchSaveResult, CacheError> {
        self.flush().await?;
        Ok(self.result)
    }

    async fn flush(&mut self) -> Result<(), CacheError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let cmds = mem::take(&mut self.pending);
        let bytes = mem::replace(&mut self.pending_bytes, 0);
        let count = cmds.len();

        let replies = self.cache.transport.exec_pipeline(cmds).await?;
        for reply in replies {
            reply?;
        }

        metrics::record_batch_flush(count, bytes);
        debug!(commands = count, bytes, "batch save flushed");
        self.result.written += count;
        self.result.flushes += 1;
        self.result.bytes += bytes;
        Ok(())
    }
}

impl Cache {
    /// Pipelined `GET` of every key.
    ///
    /// Returns the values found and the keys that were missing, each in the
    /// order the keys were given. Any error other than a miss fails the
    /// whole call.
    pub async fn pipe_get<S: AsRef<str>>(&self, keys: &[S]) -> Result<(Vec<String>, Vec<String>), CacheError> {
        if keys.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let cmds = keys.iter().map(|k| Command::get(k.as_ref())).collect();
        let replies = self.transport.exec_pipeline(cmds).await?;
        if replies.len() != keys.len() {
            return Err(CacheError::Backend(format!(
                "pipeline returned {} replies for {} commands",
                replies.len(),
                keys.len()
            )));
        }

        let mut hits = Vec::with_capacity(keys.len());
        let mut misses = Vec::new();
        for (key, reply) in keys.iter().zip(replies) {
            match reply?.into_string()? {
                Some(value) => hits.push(value),
                None => misses.push(key.as_ref().to_string()),
            }
        }

        metrics::record_pipe_get(hits.len(), misses.len());
        Ok((hits, misses))
    }

    /// [`pipe_get`](Self::pipe_get) over shards of `shot_limit` keys fetched
    /// concurrently.
    ///
    /// Fewer keys than `shot_limit` take a single round trip. With several
    /// shards the order of hits and misses across shards is unspecified. If
    /// any shard fails, every shard is still awaited and the first error
    /// observed is returned with no partial result.
    #[instrument(skip(self, keys), fields(keys = keys.len()))]
    pub async fn batch_get<S: AsRef<str>>(
        &self,
        shot_limit: usize,
        keys: &[S],
    ) -> Result<(Vec<String>, Vec<String>), CacheError> {
        if shot_limit < 1 {
            return Err(CacheError::ShotLimits(shot_limit));
        }
        if keys.len() < shot_limit {
            return self.pipe_get(keys).await;
        }

        let merged = Arc::new(Mutex::new((Vec::with_capacity(keys.len()), Vec::new())));
        let mut shards = JoinSet::new();
        for shard in keys.chunks(shot_limit) {
            let shard: Vec<String> = shard.iter().map(|k| k.as_ref().to_string()).collect();
            let cache = self.clone();
            let merged = merged.clone();
            shards.spawn(async move {
                let (hits, misses) = cache.pipe_get(&shard).await?;
                let mut acc = merged.lock();
                acc.0.extend(hits);
                acc.1.extend(misses);
                Ok::<(), CacheError>(())
            });
        }
        metrics::record_batch_get_shards(shards.len());

        let mut first_error = None;
        while let Some(joined) = shards.join_next().await {
            let outcome = joined.unwrap_or_else(|e| Err(CacheError::Interrupted(e.to_string())));
            if let Err(e) = outcome {
                warn!(error = %e, "batch get shard failed");
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut acc = merged.lock();
        Ok((mem::take(&mut acc.0), mem::take(&mut acc.1)))
    }

    /// [`batch_get`](Self::batch_get) with the cache's configured shot limit.
    pub async fn batch_get_default<S: AsRef<str>>(
        &self,
        keys: &[S],
    ) -> Result<(Vec<String>, Vec<String>), CacheError> {
        self.batch_get(self.shot_limit, keys).await
    }

    /// Open a writer for a push-style batch save.
    pub fn batch_writer(&self, expiration: Duration) -> BatchWriter<'_> {
        BatchWriter::new(self, expiration)
    }

    /// A writer using the cache's configured default expiration.
    pub fn batch_writer_default(&self) -> BatchWriter<'_> {
        BatchWriter::new(self, self.default_expiration)
    }

    /// Write every entry with pipelined `SET`s, flushing in chunks.
    ///
    /// Not atomic across chunks: on error, chunks already flushed remain.
    pub async fn batch_save<I, K, V>(&self, entries: I, expiration: Duration) -> Result<BatchSaveResult, CacheError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SaveValue>,
    {
        let mut writer = self.batch_writer(expiration);
        for (key, value) in entries {
            writer.write(key, value).await?;
        }
        writer.finish().await
    }
}
