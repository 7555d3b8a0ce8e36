//! Per-owner resource storage held in memory, externalized through a
//! [`Dumper`].

mod memory;

pub use memory::InMemoryStore;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::transport::CacheError;

/// Identifies the owner whose resources are grouped together.
pub type Uid = String;

/// Resources of one owner, keyed by [`Storable::store_name`].
pub type DataMap<T> = HashMap<String, T>;

/// A resource record. `Default` is the value handed back for a resource the
/// owner does not have.
pub trait Storable: Clone + Default + Send + Sync + 'static {
    /// The name this record is stored under within its owner's map.
    fn store_name(&self) -> String;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid user: {0}")]
    InvalidUser(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("resource not found for user: {0}")]
    ResourceNotFound(String),
    #[error("status error: {0}")]
    Status(String),
    #[error("failed to dump data to permanent storage")]
    Dump(#[source] CacheError),
    #[error("failed to load data from permanent storage")]
    Load(#[source] CacheError),
}

/// Moves a whole store to and from durable storage.
#[async_trait]
pub trait Dumper<T>: Send + Sync {
    /// Persist every owner's map under `permanent_key`.
    async fn dump(&self, permanent_key: &str, data: &HashMap<Uid, DataMap<T>>) -> Result<(), CacheError>;

    /// Read back everything persisted under `permanent_key`. Either every
    /// owner comes back or the call fails.
    async fn load(&self, permanent_key: &str) -> Result<HashMap<Uid, DataMap<T>>, CacheError>;
}

/// Resource storage contract.
///
/// Mutations mark the store dirty; [`save`](Self::save) clears the flag once
/// the dumper has the data. [`load`](Self::load) refuses to run on a dirty
/// store so unsaved writes are never silently discarded.
#[async_trait]
pub trait Storage<T: Storable>: Send + Sync {
    /// Fill `out` with the owner's resource named `out.store_name()`, or with
    /// `T::default()` if the owner has no such resource.
    async fn get(&self, owner: &str, out: &mut T) -> Result<(), StoreError>;

    /// Names of all the owner's resources, sorted.
    async fn list(&self, owner: &str) -> Result<Vec<String>, StoreError>;

    async fn set(&self, owner: &str, value: T) -> Result<(), StoreError>;

    /// Remove a resource. Removing something absent is not an error.
    async fn delete(&self, owner: &str, store_name: &str) -> Result<(), StoreError>;

    async fn is_dirty(&self) -> bool;

    async fn save(&self) -> Result<(), StoreError>;

    async fn load(&self) -> Result<(), StoreError>;
}
