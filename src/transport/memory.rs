use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::{Arg, CacheError, Command, KvTransport, Value};

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// In-process key-value service speaking the string subset of the Redis
/// command set: `GET`, `SET [EX|PX]`, `MGET`, `MSET`, `DEL`, `UNLINK`,
/// `EXISTS`, `PING`, `DBSIZE` and `FLUSHDB`.
///
/// Pipelines never fail as a whole; each command reports its own outcome.
pub struct MemoryTransport {
    data: DashMap<String, Entry>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self { data: DashMap::new() }
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.iter().filter(|e| e.value().is_live()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|e| e.value().is_live())
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.data.clear();
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        let entry = self.data.get(key)?;
        if entry.is_live() {
            return Some(entry.data.clone());
        }
        drop(entry);
        self.data.remove_if(key, |_, e| !e.is_live());
        None
    }

    fn apply(&self, cmd: &Command) -> Result<Value, CacheError> {
        let args = cmd.args();
        let name = cmd.name().to_ascii_uppercase();
        let key_at = |i: usize| -> Result<String, CacheError> {
            args.get(i)
                .map(|a| String::from_utf8_lossy(&a.as_bytes()).into_owned())
                .ok_or_else(|| wrong_arity(&name))
        };

        match name.as_str() {
            "PING" => Ok(Value::Status("PONG".into())),
            "GET" => {
                if args.len() != 2 {
                    return Err(wrong_arity(&name));
                }
                Ok(self.read(&key_at(1)?).map_or(Value::Nil, Value::Data))
            }
            "SET" => {
                if args.len() < 3 {
                    return Err(wrong_arity(&name));
                }
                let expires_at = parse_expiration(&args[3..])?.map(|ttl| Instant::now() + ttl);
                self.data.insert(
                    key_at(1)?,
                    Entry { data: args[2].as_bytes().into_owned(), expires_at },
                );
                Ok(Value::Status("OK".into()))
            }
            "MGET" => {
                if args.len() < 2 {
                    return Err(wrong_arity(&name));
                }
                let values = (1..args.len())
                    .map(|i| key_at(i).map(|k| self.read(&k).map_or(Value::Nil, Value::Data)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(values))
            }
            "MSET" => {
                if args.len() < 3 || args.len() % 2 == 0 {
                    return Err(wrong_arity(&name));
                }
                for pair in args[1..].chunks(2) {
                    let key = String::from_utf8_lossy(&pair[0].as_bytes()).into_owned();
                    self.data.insert(key, Entry { data: pair[1].as_bytes().into_owned(), expires_at: None });
                }
                Ok(Value::Status("OK".into()))
            }
            "DEL" | "UNLINK" => {
                let mut removed = 0;
                for i in 1..args.len() {
                    if self.data.remove(&key_at(i)?).is_some_and(|(_, e)| e.is_live()) {
                        removed += 1;
                    }
                }
                Ok(Value::Int(removed))
            }
            "EXISTS" => {
                let mut found = 0;
                for i in 1..args.len() {
                    if self.read(&key_at(i)?).is_some() {
                        found += 1;
                    }
                }
                Ok(Value::Int(found))
            }
            "DBSIZE" => Ok(Value::Int(self.len() as i64)),
            "FLUSHDB" => {
                self.clear();
                Ok(Value::Status("OK".into()))
            }
            other => Err(CacheError::Backend(format!("ERR unknown command '{}'", other))),
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_arity(name: &str) -> CacheError {
    CacheError::Backend(format!("ERR wrong number of arguments for '{}' command", name.to_lowercase()))
}

fn parse_expiration(options: &[Arg]) -> Result<Option<Duration>, CacheError> {
    let mut ttl = None;
    let mut iter = options.iter();
    while let Some(opt) = iter.next() {
        let unit = String::from_utf8_lossy(&opt.as_bytes()).to_ascii_uppercase();
        let amount = iter
            .next()
            .and_then(Arg::as_int)
            .filter(|n| *n > 0)
            .ok_or_else(|| CacheError::Backend("ERR invalid expire time in 'set' command".into()))?;
        ttl = match unit.as_str() {
            "EX" => Some(Duration::from_secs(amount as u64)),
            "PX" => Some(Duration::from_millis(amount as u64)),
            _ => return Err(CacheError::Backend("ERR syntax error".into())),
        };
    }
    Ok(ttl)
}

#[async_trait]
impl KvTransport for MemoryTransport {
    async fn exec(&self, cmd: Command) -> Result<Value, CacheError> {
        self.apply(&cmd)
    }

    async fn exec_pipeline(
        &self,
        cmds: Vec<Command>,
    ) -> Result<Vec<Result<Value, CacheError>>, CacheError> {
        Ok(cmds.iter().map(|cmd| self.apply(cmd)).collect())
    }
}
