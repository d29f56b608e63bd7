use std::sync::Arc;
use std::time::Duration;

use super::stats::LatencySummary;

/// Counters sampled at one progress tick.
#[derive(Debug, Clone)]
pub struct LiveStats {
    pub total_calls: u64,
    pub ok_calls: u64,
    pub failed_calls: u64,
    pub timeout_calls: u64,
    pub canceled_calls: u64,
    /// Throughput over the last interval.
    pub rps_now: f64,
    /// Whole-run latency aggregates so far.
    pub latency_ms: LatencySummary,
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// 1-based tick number.
    pub tick: u64,
    pub elapsed: Duration,
    pub stats: LiveStats,
}

/// Invoked from the progress ticker task every progress interval. Keep it
/// cheap; the ticker does not buffer behind a slow callback.
pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;
