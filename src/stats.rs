//! Per-model inference statistics
//!
//! Counters are atomics so the hot dispatch path never takes a lock.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Statistics for one deployed model.
#[derive(Debug)]
pub struct ModelStats {
    /// Successful inference calls
    pub predict_count: AtomicU64,

    /// Failed inference calls
    pub predict_failures: AtomicU64,

    /// Cumulative inference latency in microseconds
    pub total_latency_micros: AtomicU64,

    /// When the model became ready
    pub deployed_at: Instant,
}

/// Point-in-time copy of the counters, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub predict_count: u64,
    pub predict_failures: u64,
    pub avg_latency_ms: f64,
    pub uptime_seconds: u64,
}

impl Default for ModelStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelStats {
    pub fn new() -> Self {
        Self {
            predict_count: AtomicU64::new(0),
            predict_failures: AtomicU64::new(0),
            total_latency_micros: AtomicU64::new(0),
            deployed_at: Instant::now(),
        }
    }

    /// Record a successful inference call and its latency.
    pub fn record_success(&self, latency_micros: u64) {
        self.predict_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_micros
            .fetch_add(latency_micros, Ordering::Relaxed);
    }

    /// Record a failed inference call.
    pub fn record_failure(&self) {
        self.predict_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Average latency per successful call in milliseconds.
    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.predict_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.total_latency_micros.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            predict_count: self.predict_count.load(Ordering::Relaxed),
            predict_failures: self.predict_failures.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            uptime_seconds: self.deployed_at.elapsed().as_secs(),
        }
    }
}
