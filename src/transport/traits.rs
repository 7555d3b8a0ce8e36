use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the transport and the batched access layer.
///
/// Variants carry rendered messages rather than source errors so the type is
/// `Clone`; single-flight hands the same outcome to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),
    #[error("shot limit must be at least 1, got {0}")]
    ShotLimits(usize),
    #[error("wrong type: expected {expected}, got {found}")]
    Type { expected: &'static str, found: String },
    #[error("failed to encode value for '{key}': {reason}")]
    Encode { key: String, reason: String },
    #[error("failed to decode value of '{key}': {reason}")]
    Decode { key: String, reason: String },
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("operation interrupted: {0}")]
    Interrupted(String),
}

/// A single positional argument of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Str(String),
    Int(i64),
    Bytes(Vec<u8>),
}

impl Arg {
    /// Wire representation of the argument.
    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Arg::Str(s) => Cow::Borrowed(s.as_bytes()),
            Arg::Int(i) => Cow::Owned(i.to_string().into_bytes()),
            Arg::Bytes(b) => Cow::Borrowed(b.as_slice()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view used for `numkeys`-style arguments.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Arg::Int(i) => Some(*i),
            Arg::Str(s) => s.parse().ok(),
            Arg::Bytes(_) => None,
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Self {
        Arg::Str(s.clone())
    }
}

impl From<Vec<u8>> for Arg {
    fn from(b: Vec<u8>) -> Self {
        Arg::Bytes(b)
    }
}

macro_rules! int_arg {
    ($($t:ty),*) => {
        $(impl From<$t> for Arg {
            fn from(i: $t) -> Self {
                Arg::Int(i as i64)
            }
        })*
    };
}

int_arg!(i32, i64, u32, u64, usize);

/// An outgoing command: the name at offset 0 followed by its arguments.
///
/// Offsets follow the wire layout, so in `SET k v` the key sits at offset 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Arg>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self { args: vec![Arg::Str(name.into())] }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn get(key: impl Into<String>) -> Self {
        Self::new("GET").arg(key.into())
    }

    /// `SET key value`, with `EX`/`PX` when `expiration` is non-zero.
    pub fn set(key: impl Into<String>, value: impl Into<Arg>, expiration: Duration) -> Self {
        let cmd = Self::new("SET").arg(key.into()).arg(value);
        if expiration.is_zero() {
            cmd
        } else if expiration.subsec_nanos() == 0 {
            cmd.arg("EX").arg(expiration.as_secs())
        } else {
            // Sub-millisecond remainders round down, but never to zero.
            cmd.arg("PX").arg(expiration.as_millis().max(1) as u64)
        }
    }

    /// Command name, or `""` when offset 0 is not textual.
    pub fn name(&self) -> &str {
        self.args.first().and_then(Arg::as_str).unwrap_or("")
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut [Arg] {
        &mut self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// A reply from the key-value service.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The "not found" sentinel.
    Nil,
    Int(i64),
    Data(Vec<u8>),
    Status(String),
    Array(Vec<Value>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Int(_) => "integer",
            Value::Data(_) => "bulk string",
            Value::Status(_) => "status",
            Value::Array(_) => "array",
        }
    }

    /// Interprets the reply as an optional string, `Nil` meaning absent.
    pub fn into_string(self) -> Result<Option<String>, CacheError> {
        match self {
            Value::Nil => Ok(None),
            Value::Status(s) => Ok(Some(s)),
            Value::Data(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| CacheError::Type {
                expected: "utf-8 string",
                found: e.to_string(),
            }),
            other => Err(CacheError::Type {
                expected: "string",
                found: other.kind().to_string(),
            }),
        }
    }

    /// Status/OK check for write commands.
    pub fn expect_ok(self) -> Result<(), CacheError> {
        match self {
            Value::Status(_) | Value::Int(_) => Ok(()),
            other => Err(CacheError::Type {
                expected: "status",
                found: other.kind().to_string(),
            }),
        }
    }
}

/// The remote key-value service as seen by this crate.
///
/// Implementations own connection handling; callers share one instance
/// through `Arc`.
#[async_trait]
pub trait KvTransport: Send + Sync {
    /// Execute a single command.
    async fn exec(&self, cmd: Command) -> Result<Value, CacheError>;

    /// Send a batch of commands as one unit.
    ///
    /// The outer error reports a failure of the pipeline itself; every
    /// command's own outcome is inspectable through the inner results.
    async fn exec_pipeline(
        &self,
        cmds: Vec<Command>,
    ) -> Result<Vec<Result<Value, CacheError>>, CacheError>;
}

#[async_trait]
impl<T: KvTransport + ?Sized> KvTransport for Arc<T> {
    async fn exec(&self, cmd: Command) -> Result<Value, CacheError> {
        (**self).exec(cmd).await
    }

    async fn exec_pipeline(
        &self,
        cmds: Vec<Command>,
    ) -> Result<Vec<Result<Value, CacheError>>, CacheError> {
        (**self).exec_pipeline(cmds).await
    }
}
