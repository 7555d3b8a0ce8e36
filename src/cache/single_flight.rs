use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use super::Cache;
use crate::metrics;
use crate::transport::CacheError;

type Outcome = Result<Option<String>, CacheError>;
type InFlight = Arc<Mutex<HashMap<String, broadcast::Sender<Outcome>>>>;

/// Collapses concurrent reads of the same key into one fetch.
///
/// The first caller for a key runs `GET` and every caller that arrives while
/// it is running receives a clone of the same outcome, error included. Once
/// the fetch lands the key is forgotten and the next call fetches again.
/// Clones share the in-flight table.
#[derive(Clone)]
pub struct SingleFlight {
    cache: Cache,
    inflight: InFlight,
}

impl SingleFlight {
    pub fn new(cache: Cache) -> Self {
        Self { cache, inflight: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Read `key` as a string, sharing any fetch already in flight.
    ///
    /// `Ok(None)` is a miss. A stored value that is not a string yields
    /// [`CacheError::Type`]. If the caller leading the fetch is cancelled,
    /// waiting callers get [`CacheError::Interrupted`].
    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let waiting = {
            let mut inflight = self.inflight.lock();
            match inflight.get(key) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    inflight.insert(key.to_string(), tx);
                    None
                }
            }
        };

        if let Some(mut rx) = waiting {
            metrics::record_single_flight(true);
            debug!(key, "joining in-flight fetch");
            return match rx.recv().await {
                Ok(outcome) => outcome,
                Err(e) => Err(CacheError::Interrupted(format!("in-flight fetch of '{}' abandoned: {}", key, e))),
            };
        }

        metrics::record_single_flight(false);
        let mut flight = Flight { key, inflight: &self.inflight, landed: false };
        let outcome = self.cache.get(key).await;
        flight.land(&outcome);
        outcome
    }

    /// Keys with a fetch currently running.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}

/// Leader's hold on an in-flight entry. Dropping it without landing (the
/// leader was cancelled) removes the entry, which closes the channel.
struct Flight<'a> {
    key: &'a str,
    inflight: &'a InFlight,
    landed: bool,
}

impl Flight<'_> {
    fn land(&mut self, outcome: &Outcome) {
        if let Some(tx) = self.inflight.lock().remove(self.key) {
            // No receivers is fine.
            let _ = tx.send(outcome.clone());
        }
        self.landed = true;
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.landed {
            self.inflight.lock().remove(self.key);
        }
    }
}
