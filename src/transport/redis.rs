//! Redis-backed transport.
//!
//! Wraps a [`ConnectionManager`], which multiplexes one connection and
//! reconnects on its own. Cloning the transport shares that connection.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Cmd, Pipeline};
use tracing::{debug, instrument};

use super::traits::{Arg, CacheError, Command, KvTransport, Value};
use crate::resilience::retry::{retry, RetryConfig};

#[derive(Clone)]
pub struct RedisTransport {
    connection: ConnectionManager,
}

impl RedisTransport {
    /// Connect with the startup retry policy: fail after a handful of
    /// attempts instead of hanging on a bad URL.
    pub async fn connect(connection_string: &str) -> Result<Self, CacheError> {
        Self::connect_with(connection_string, &RetryConfig::startup()).await
    }

    #[instrument(skip_all)]
    pub async fn connect_with(
        connection_string: &str,
        retry_config: &RetryConfig,
    ) -> Result<Self, CacheError> {
        let client = Client::open(connection_string).map_err(backend)?;

        let connection = retry("redis_connect", retry_config, || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(backend)?;

        debug!("connected to redis");
        Ok(Self { connection })
    }

    /// Wrap an already established connection.
    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

fn backend(e: redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

fn to_redis_cmd(cmd: &Command) -> Cmd {
    let mut args = cmd.args().iter();
    let mut out = match args.next() {
        Some(Arg::Str(name)) => redis::cmd(name),
        _ => Cmd::new(),
    };
    for arg in args {
        match arg {
            Arg::Str(s) => out.arg(s),
            Arg::Int(i) => out.arg(*i),
            Arg::Bytes(b) => out.arg(b.as_slice()),
        };
    }
    out
}

fn from_redis_value(value: redis::Value) -> Value {
    match value {
        redis::Value::Nil => Value::Nil,
        redis::Value::Int(i) => Value::Int(i),
        redis::Value::BulkString(bytes) => Value::Data(bytes),
        redis::Value::SimpleString(s) => Value::Status(s),
        redis::Value::Okay => Value::Status("OK".into()),
        redis::Value::Array(items) | redis::Value::Set(items) => {
            Value::Array(items.into_iter().map(from_redis_value).collect())
        }
        redis::Value::Boolean(b) => Value::Int(i64::from(b)),
        redis::Value::Double(d) => Value::Status(d.to_string()),
        other => Value::Status(format!("{:?}", other)),
    }
}

#[async_trait]
impl KvTransport for RedisTransport {
    async fn exec(&self, cmd: Command) -> Result<Value, CacheError> {
        let mut conn = self.connection.clone();
        let reply: redis::Value = to_redis_cmd(&cmd).query_async(&mut conn).await.map_err(backend)?;
        Ok(from_redis_value(reply))
    }

    /// Redis rejects a pipeline as a whole when any command in it errors,
    /// so every inner result is `Ok` once the outer call succeeds.
    async fn exec_pipeline(
        &self,
        cmds: Vec<Command>,
    ) -> Result<Vec<Result<Value, CacheError>>, CacheError> {
        if cmds.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipeline = Pipeline::with_capacity(cmds.len());
        for cmd in &cmds {
            pipeline.add_command(to_redis_cmd(cmd));
        }

        let mut conn = self.connection.clone();
        let replies: Vec<redis::Value> = pipeline.query_async(&mut conn).await.map_err(backend)?;
        Ok(replies.into_iter().map(|v| Ok(from_redis_value(v))).collect())
    }
}
