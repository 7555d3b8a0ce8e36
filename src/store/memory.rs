// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::{DataMap, Dumper, Storable, Storage, StoreError, Uid};
use crate::metrics::{self, LatencyTimer};

struct State<T> {
    data: HashMap<Uid, DataMap<T>>,
    dirty: bool,
    saved_at: Option<i64>,
}

/// [`Storage`] backed by a map held in process memory.
///
/// One lock guards the map, the dirty flag and the save timestamp. `save`
/// and `load` hold it exclusively for the whole dumper call, so no read or
/// write interleaves with externalization.
pub struct InMemoryStore<T> {
    permanent_key: String,
    state: RwLock<State<T>>,
    dumper: Option<Arc<dyn Dumper<T>>>,
}

impl<T: Storable> InMemoryStore<T> {
    #[must_use]
    pub fn new(permanent_key: impl Into<String>) -> Self {
        Self {
            permanent_key: permanent_key.into(),
            state: RwLock::new(State { data: HashMap::new(), dirty: false, saved_at: None }),
            dumper: None,
        }
    }

    #[must_use]
    pub fn with_dumper(mut self, dumper: Arc<dyn Dumper<T>>) -> Self {
        self.dumper = Some(dumper);
        self
    }

    pub fn set_dumper(&mut self, dumper: Arc<dyn Dumper<T>>) {
        self.dumper = Some(dumper);
    }

    pub fn permanent_key(&self) -> &str {
        &self.permanent_key
    }

    /// Unix seconds of the last successful save or load.
    pub async fn saved_at(&self) -> Option<i64> {
        self.state.read().await.saved_at
    }

    /// Number of owners with a bucket, empty buckets included.
    pub async fn owner_count(&self) -> usize {
        self.state.read().await.data.len()
    }

    /// Atomically replace, create or remove one resource.
    ///
    /// `transform` sees the current value (`None` if absent). Returning
    /// `Ok(Some(v))` stores `v`, `Ok(None)` removes the resource, and an
    /// error is handed back with the store untouched. The store is marked
    /// dirty only when the transform succeeds.
    pub async fn update<F, E>(&self, owner: &str, store_name: &str, transform: F) -> Result<(), E>
    where
        F: FnOnce(Option<&T>) -> Result<Option<T>, E> + Send,
        E: From<StoreError>,
    {
        validate_owner(owner)?;
        validate_name(store_name)?;

        let mut state = self.state.write().await;
        let current = state.data.get(owner).and_then(|bucket| bucket.get(store_name));
        let next = transform(current)?;

        let bucket = state.data.entry(owner.to_string()).or_default();
        match next {
            Some(value) => {
                bucket.insert(store_name.to_string(), value);
            }
            None => {
                bucket.remove(store_name);
            }
        }
        state.dirty = true;
        Ok(())
    }

    fn dumper(&self) -> Result<&Arc<dyn Dumper<T>>, StoreError> {
        self.dumper.as_ref().ok_or_else(|| StoreError::Status("dumper is not set".into()))
    }
}

fn validate_owner(owner: &str) -> Result<(), StoreError> {
    if owner.is_empty() {
        return Err(StoreError::InvalidUser("user cannot be empty".into()));
    }
    Ok(())
}

fn validate_name(store_name: &str) -> Result<(), StoreError> {
    if store_name.is_empty() {
        return Err(StoreError::InvalidInput("store name cannot be empty".into()));
    }
    Ok(())
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl<T: Storable> Storage<T> for InMemoryStore<T> {
    async fn get(&self, owner: &str, out: &mut T) -> Result<(), StoreError> {
        validate_owner(owner)?;
        let name = out.store_name();
        validate_name(&name)?;

        let state = self.state.read().await;
        let bucket = state
            .data
            .get(owner)
            .ok_or_else(|| StoreError::UserNotFound(owner.to_string()))?;
        *out = bucket.get(&name).cloned().unwrap_or_default();
        Ok(())
    }

    async fn list(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        validate_owner(owner)?;

        let state = self.state.read().await;
        let bucket = state
            .data
            .get(owner)
            .ok_or_else(|| StoreError::ResourceNotFound(owner.to_string()))?;
        let mut names: Vec<String> = bucket.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn set(&self, owner: &str, value: T) -> Result<(), StoreError> {
        validate_owner(owner)?;
        let name = value.store_name();
        validate_name(&name)?;

        let mut state = self.state.write().await;
        state.data.entry(owner.to_string()).or_default().insert(name, value);
        state.dirty = true;
        Ok(())
    }

    async fn delete(&self, owner: &str, store_name: &str) -> Result<(), StoreError> {
        validate_owner(owner)?;
        validate_name(store_name)?;

        let mut state = self.state.write().await;
        state.dirty = true;
        // The owner bucket stays even when it empties.
        if let Some(bucket) = state.data.get_mut(owner) {
            bucket.remove(store_name);
        }
        Ok(())
    }

    async fn is_dirty(&self) -> bool {
        self.state.read().await.dirty
    }

    #[instrument(skip(self), fields(store = %self.permanent_key))]
    async fn save(&self) -> Result<(), StoreError> {
        let _timer = LatencyTimer::new("store", "save");
        let mut state = self.state.write().await;
        if !state.dirty {
            debug!("store is clean, nothing to save");
            return Ok(());
        }
        let dumper = self.dumper()?;

        if let Err(e) = dumper.dump(&self.permanent_key, &state.data).await {
            warn!(error = %e, "store save failed");
            metrics::record_operation("store", "save", "error");
            return Err(StoreError::Dump(e));
        }

        state.dirty = false;
        state.saved_at = Some(unix_now());
        metrics::record_operation("store", "save", "success");
        metrics::set_store_owners(&self.permanent_key, state.data.len());
        info!(owners = state.data.len(), "store saved");
        Ok(())
    }

    #[instrument(skip(self), fields(store = %self.permanent_key))]
    async fn load(&self) -> Result<(), StoreError> {
        let _timer = LatencyTimer::new("store", "load");
        let mut state = self.state.write().await;
        if state.dirty {
            return Err(StoreError::Status("cannot load data when storage is dirty".into()));
        }
        let dumper = self.dumper()?;

        let data = match dumper.load(&self.permanent_key).await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "store load failed");
                metrics::record_operation("store", "load", "error");
                return Err(StoreError::Load(e));
            }
        };

        state.data = data;
        state.saved_at = Some(unix_now());
        metrics::record_operation("store", "load", "success");
        metrics::set_store_owners(&self.permanent_key, state.data.len());
        info!(owners = state.data.len(), "store loaded");
        Ok(())
    }
}
