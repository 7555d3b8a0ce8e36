//! Configuration for the cache client.
//!
//! # Example
//!
//! ```
//! use memstore::CacheConfig;
//!
//! // Minimal config (uses defaults)
//! let config = CacheConfig::default();
//! assert_eq!(config.shot_limit, 100);
//!
//! // Namespaced client
//! let config = CacheConfig {
//!     redis_url: "redis://localhost:6379".into(),
//!     key_prefix: Some("game".into()),
//!     ..Default::default()
//! };
//! assert_eq!(config.default_expiration().as_secs(), 0);
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Settings for [`Cache::connect`](crate::Cache::connect).
///
/// Every field has a default, so partial documents deserialize.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Redis connection string
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Namespace prepended to every key on the wire (`"game"` → `"game:..."`)
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Shard size for `batch_get`
    #[serde(default = "default_shot_limit")]
    pub shot_limit: usize,

    /// Expiration applied by callers that don't pick their own (0 = never)
    #[serde(default)]
    pub default_expiration_secs: u64,

    /// Connection attempts before giving up at startup
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: usize,
}

fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_shot_limit() -> usize { 100 }
fn default_connect_attempts() -> usize { 5 }

impl CacheConfig {
    pub fn default_expiration(&self) -> Duration {
        Duration::from_secs(self.default_expiration_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            key_prefix: None,
            shot_limit: default_shot_limit(),
            default_expiration_secs: 0,
            connect_attempts: default_connect_attempts(),
        }
    }
}
