//! The key-value service boundary.
//!
//! - [`KvTransport`]: single-command and pipelined execution
//! - [`RedisTransport`]: production backend
//! - [`MemoryTransport`]: in-process backend for tests and embedded use

pub mod memory;
pub mod redis;
pub mod traits;

pub use memory::MemoryTransport;
pub use self::redis::RedisTransport;
pub use traits::{Arg, CacheError, Command, KvTransport, Value};
