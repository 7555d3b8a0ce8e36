//! Store persistence through the batched cache layer.
//!
//! Layout for a store with permanent key `P`:
//!
//! | key | value |
//! |---|---|
//! | `store:P:<owner>` | JSON object, resource name → resource |
//! | `store:P:__index` | JSON array of the owners written |

use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::cache::{Cache, SaveValue};
use crate::config::CacheConfig;
use crate::key_params;
use crate::keyschema::KeySchema;
use crate::metrics::{self, LatencyTimer};
use crate::store::{DataMap, Dumper, Storable, Uid};
use crate::transport::CacheError;

/// Owner slot holding the index of every owner dumped.
pub const INDEX_OWNER: &str = "__index";

struct BucketKey {
    permanent_key: String,
    owner: String,
}

key_params!(BucketKey { permanent_key, owner });

/// A [`Dumper`] writing each owner's map as one JSON value in the cache.
pub struct CacheDumper<T> {
    cache: Cache,
    bucket: KeySchema<BucketKey>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CacheDumper<T>
where
    T: Storable + Serialize + DeserializeOwned,
{
    pub fn new(cache: Cache) -> Self {
        Self {
            cache,
            bucket: KeySchema::must_new("store:{permanent_key}:{owner}", Duration::ZERO),
            _marker: PhantomData,
        }
    }

    /// Connect a fresh cache per `config` and dump through it.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        Ok(Self::new(Cache::connect(config).await?))
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Key of `owner`'s bucket under `permanent_key`.
    pub fn bucket_key(&self, permanent_key: &str, owner: &str) -> String {
        self.bucket.build(&BucketKey { permanent_key: permanent_key.to_string(), owner: owner.to_string() })
    }

    async fn write_all(&self, permanent_key: &str, data: &HashMap<Uid, DataMap<T>>) -> Result<(), CacheError> {
        let mut owners: Vec<&Uid> = data.keys().collect();
        owners.sort();

        let mut writer = self.cache.batch_writer(Duration::ZERO);
        for owner in &owners {
            let key = self.bucket_key(permanent_key, owner);
            let value = SaveValue::json(&data[*owner]).map_err(|e| keyed(e, &key))?;
            writer.write(key, value).await?;
        }
        let result = writer.finish().await?;

        let index_key = self.bucket_key(permanent_key, INDEX_OWNER);
        let index = serde_json::to_string(&owners)
            .map_err(|e| CacheError::Encode { key: index_key.clone(), reason: e.to_string() })?;
        self.cache.set(&index_key, &index, Duration::ZERO).await?;

        debug!(written = result.written, flushes = result.flushes, bytes = result.bytes, "owners dumped");
        Ok(())
    }

    async fn read_all(&self, permanent_key: &str) -> Result<HashMap<Uid, DataMap<T>>, CacheError> {
        let index_key = self.bucket_key(permanent_key, INDEX_OWNER);
        let index = self
            .cache
            .get(&index_key)
            .await?
            .ok_or_else(|| CacheError::NotFound(index_key.clone()))?;
        let owners: Vec<Uid> = serde_json::from_str(&index)
            .map_err(|e| CacheError::Decode { key: index_key.clone(), reason: e.to_string() })?;

        let keys: Vec<String> = owners.iter().map(|o| self.bucket_key(permanent_key, o)).collect();
        let (hits, misses) = self.cache.pipe_get(&keys).await?;
        if let Some(missing) = misses.into_iter().next() {
            return Err(CacheError::NotFound(missing));
        }

        // No misses, so hits line up with keys.
        let mut data = HashMap::with_capacity(owners.len());
        for ((owner, key), raw) in owners.into_iter().zip(&keys).zip(hits) {
            let resources: DataMap<T> = serde_json::from_str(&raw)
                .map_err(|e| CacheError::Decode { key: key.clone(), reason: e.to_string() })?;
            data.insert(owner, resources);
        }
        Ok(data)
    }
}

fn keyed(err: CacheError, key: &str) -> CacheError {
    match err {
        CacheError::Encode { reason, .. } => CacheError::Encode { key: key.to_string(), reason },
        other => other,
    }
}

fn status<V>(outcome: &Result<V, CacheError>) -> &'static str {
    if outcome.is_ok() {
        "success"
    } else {
        "error"
    }
}

#[async_trait]
impl<T> Dumper<T> for CacheDumper<T>
where
    T: Storable + Serialize + DeserializeOwned,
{
    #[instrument(skip(self, data), fields(owners = data.len()))]
    async fn dump(&self, permanent_key: &str, data: &HashMap<Uid, DataMap<T>>) -> Result<(), CacheError> {
        let _timer = LatencyTimer::new("dumper", "dump");
        let outcome = self.write_all(permanent_key, data).await;
        if let Err(e) = &outcome {
            warn!(error = %e, "dump failed");
        }
        metrics::record_operation("dumper", "dump", status(&outcome));
        outcome
    }

    #[instrument(skip(self))]
    async fn load(&self, permanent_key: &str) -> Result<HashMap<Uid, DataMap<T>>, CacheError> {
        let _timer = LatencyTimer::new("dumper", "load");
        let outcome = self.read_all(permanent_key).await;
        match &outcome {
            Ok(data) => debug!(owners = data.len(), "owners loaded"),
            Err(e) => warn!(error = %e, "load failed"),
        }
        metrics::record_operation("dumper", "load", status(&outcome));
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::PrefixedTransport;
    use crate::store::{InMemoryStore, Storage, StoreError};
    use crate::transport::MemoryTransport;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
        count: u32,
    }

    impl Storable for Item {
        fn store_name(&self) -> String {
            self.name.clone()
        }
    }

    fn item(name: &str, count: u32) -> Item {
        Item { name: name.into(), count }
    }

    fn dumper_over(transport: Arc<MemoryTransport>) -> Arc<CacheDumper<Item>> {
        Arc::new(CacheDumper::new(Cache::from_shared(transport)))
    }

    #[test]
    fn test_bucket_key() {
        let dumper = dumper_over(Arc::new(MemoryTransport::new()));
        assert_eq!(dumper.bucket_key("inventory", "u1"), "store:inventory:u1");
        assert_eq!(dumper.bucket_key("inventory", INDEX_OWNER), "store:inventory:__index");
    }

    #[tokio::test]
    async fn test_round_trip_between_stores() {
        let transport = Arc::new(MemoryTransport::new());
        let dumper = dumper_over(transport.clone());

        let first = InMemoryStore::<Item>::new("inventory").with_dumper(dumper.clone());
        first.set("u1", item("sword", 1)).await.unwrap();
        first.set("u1", item("shield", 2)).await.unwrap();
        first.set("u2", item("potion", 7)).await.unwrap();
        first.save().await.unwrap();

        let second = InMemoryStore::<Item>::new("inventory").with_dumper(dumper.clone());
        second.load().await.unwrap();

        assert_eq!(second.list("u1").await.unwrap(), vec!["shield", "sword"]);
        let mut out = item("potion", 0);
        second.get("u2", &mut out).await.unwrap();
        assert_eq!(out, item("potion", 7));
    }

    #[tokio::test]
    async fn test_durable_layout() {
        let transport = Arc::new(MemoryTransport::new());
        let dumper = dumper_over(transport.clone());

        let mut data = HashMap::new();
        data.insert("o2".to_string(), DataMap::from([("a".to_string(), item("a", 1))]));
        data.insert("o1".to_string(), DataMap::new());
        dumper.dump("P", &data).await.unwrap();

        assert_eq!(transport.keys(), vec!["store:P:__index", "store:P:o1", "store:P:o2"]);

        let cache = dumper.cache();
        let index = cache.get("store:P:__index").await.unwrap().unwrap();
        assert_eq!(index, r#"["o1","o2"]"#);

        let bucket = cache.get("store:P:o2").await.unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&bucket).unwrap();
        assert_eq!(parsed, serde_json::json!({"a": {"name": "a", "count": 1}}));
    }

    #[tokio::test]
    async fn test_empty_store_round_trip() {
        let transport = Arc::new(MemoryTransport::new());
        let dumper = dumper_over(transport.clone());

        dumper.dump("empty", &HashMap::new()).await.unwrap();
        assert_eq!(transport.keys(), vec!["store:empty:__index"]);
        assert!(dumper.load("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_without_index() {
        let dumper = dumper_over(Arc::new(MemoryTransport::new()));
        let err = dumper.load("never-saved").await.unwrap_err();
        assert_eq!(err, CacheError::NotFound("store:never-saved:__index".into()));
    }

    #[tokio::test]
    async fn test_load_fails_when_a_bucket_is_missing() {
        let transport = Arc::new(MemoryTransport::new());
        let dumper = dumper_over(transport.clone());

        let mut data = HashMap::new();
        data.insert("u1".to_string(), DataMap::from([("a".to_string(), item("a", 1))]));
        data.insert("u2".to_string(), DataMap::from([("b".to_string(), item("b", 2))]));
        dumper.dump("inv", &data).await.unwrap();

        dumper.cache().del(&["store:inv:u2"]).await.unwrap();
        let err = dumper.load("inv").await.unwrap_err();
        assert_eq!(err, CacheError::NotFound("store:inv:u2".into()));
    }

    #[tokio::test]
    async fn test_load_fails_on_undecodable_bucket() {
        let transport = Arc::new(MemoryTransport::new());
        let dumper = dumper_over(transport.clone());
        let cache = dumper.cache();

        cache.set("store:inv:__index", r#"["u1"]"#, Duration::ZERO).await.unwrap();
        cache.set("store:inv:u1", "not json", Duration::ZERO).await.unwrap();

        let err = dumper.load("inv").await.unwrap_err();
        assert!(matches!(err, CacheError::Decode { ref key, .. } if key == "store:inv:u1"));

        // A failed load surfaces through the store and leaves it empty.
        let store = InMemoryStore::<Item>::new("inv").with_dumper(dumper.clone());
        assert!(matches!(store.load().await, Err(StoreError::Load(CacheError::Decode { .. }))));
        assert_eq!(store.owner_count().await, 0);
    }

    #[tokio::test]
    async fn test_dump_through_prefixed_cache() {
        let backing = Arc::new(MemoryTransport::new());
        let cache = Cache::new(PrefixedTransport::new(backing.clone(), "game"));
        let dumper = Arc::new(CacheDumper::<Item>::new(cache));

        let store = InMemoryStore::<Item>::new("inv").with_dumper(dumper.clone());
        store.set("u1", item("a", 1)).await.unwrap();
        store.save().await.unwrap();

        assert_eq!(backing.keys(), vec!["game:store:inv:__index", "game:store:inv:u1"]);

        let reloaded = InMemoryStore::<Item>::new("inv").with_dumper(dumper);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.list("u1").await.unwrap(), vec!["a"]);
    }
}
