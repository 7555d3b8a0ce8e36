// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Exponential backoff for establishing backend connections.
//!
//! Only connection setup retries. Commands themselves are issued once and
//! their failures are returned to the caller.
//!
//! ```
//! use memstore::RetryConfig;
//!
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_attempts, 5);
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts including the first one.
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::startup()
    }
}

impl RetryConfig {
    /// Five attempts over roughly three seconds.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// No retry at all.
    #[must_use]
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
        }
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.factor).min(self.max_delay)
    }
}

pub async fn retry<F, Fut, T, E>(operation_name: &str, config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(val) => {
                if attempt > 1 {
                    info!("'{}' succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(val);
            }
            Err(err) if attempt >= config.max_attempts.max(1) => return Err(err),
            Err(err) => {
                warn!(
                    "'{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                    operation_name, attempt, config.max_attempts, err, delay
                );
                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
