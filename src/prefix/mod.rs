//! Key namespacing on the wire.
//!
//! A [`Prefix`] rewrites the key-bearing arguments of every outgoing command,
//! so several applications can share one Redis without their keys colliding.
//! [`PrefixedTransport`] installs the rewrite in front of any transport:
//!
//! ```
//! use memstore::{Cache, MemoryTransport, Prefix, PrefixedTransport};
//!
//! let transport = PrefixedTransport::new(MemoryTransport::new(), Prefix::new("game"));
//! let cache = Cache::new(transport);
//! // cache.set("uid001", ...) lands under "game:uid001"
//! # let _ = cache;
//! ```

mod hook;

pub use hook::{KeyLayout, PrefixedTransport};

use std::fmt;

/// A key namespace. Empty means no rewriting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Prefix(String);

impl Prefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for `""` and for colon-only prefixes such as `":"`; neither
    /// rewrites keys.
    pub fn is_empty(&self) -> bool {
        self.0.trim_end_matches(':').is_empty()
    }

    /// The prefix followed by exactly one `:`, or `""` for an empty prefix.
    pub fn colon_str(&self) -> String {
        let base = self.0.trim_end_matches(':');
        if base.is_empty() {
            String::new()
        } else {
            format!("{}:", base)
        }
    }

    pub fn make_key(&self, key: &str) -> String {
        let mut out = self.colon_str();
        out.push_str(key);
        out
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Prefix {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Prefix {
    fn from(s: String) -> Self {
        Self(s)
    }
}
