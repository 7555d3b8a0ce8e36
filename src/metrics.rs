// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for memstore.
//!
//! Uses the `metrics` crate facade; the host application installs the
//! exporter (Prometheus, OTEL, a debugging recorder in tests).
//!
//! # Metric Naming Convention
//! - `memstore_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size histograms
//!
//! # Labels
//! - `layer`: store, cache, dumper
//! - `operation`: save, load, pipe_get, batch_get, batch_save, single_flight
//! - `status`: success, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record the outcome of an operation
pub fn record_operation(layer: &str, operation: &str, status: &str) {
    counter!(
        "memstore_operations_total",
        "layer" => layer.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(layer: &str, operation: &str, duration: Duration) {
    histogram!(
        "memstore_operation_seconds",
        "layer" => layer.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record hit/miss split of a pipelined multi-get
pub fn record_pipe_get(hits: usize, misses: usize) {
    counter!("memstore_cache_hits_total").increment(hits as u64);
    counter!("memstore_cache_misses_total").increment(misses as u64);
}

/// Record the number of shards a batch get fanned out to
pub fn record_batch_get_shards(shards: usize) {
    histogram!("memstore_batch_get_shards").record(shards as f64);
}

/// Record one batch-save pipeline flush
pub fn record_batch_flush(commands: usize, bytes: usize) {
    counter!("memstore_batch_save_flushes_total").increment(1);
    histogram!("memstore_batch_save_flush_commands").record(commands as f64);
    histogram!("memstore_batch_save_flush_bytes").record(bytes as f64);
}

/// Record a single-flight call; `shared` is true when the caller piggybacked
/// on a fetch already in flight
pub fn record_single_flight(shared: bool) {
    counter!(
        "memstore_single_flight_calls_total",
        "shared" => if shared { "true" } else { "false" }
    )
    .increment(1);
}

/// Set the number of owners held by a store after save/load
pub fn set_store_owners(permanent_key: &str, owners: usize) {
    gauge!(
        "memstore_store_owners",
        "store" => permanent_key.to_string()
    )
    .set(owners as f64);
}

/// Timer guard recording latency on drop
pub struct LatencyTimer {
    layer: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(layer: &'static str, operation: &'static str) -> Self {
        Self {
            layer,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.layer, self.operation, self.start.elapsed());
    }
}
