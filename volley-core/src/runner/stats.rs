use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use hdrhistogram::Histogram;

use crate::grpc::TransportErrorKind;

/// Outcome of a single call attempt. Everything that is not `Ok` is data,
/// not an error path: workers record it and keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Ok,
    /// Non-OK gRPC status received from the server, by numeric code.
    Grpc(u16),
    /// Failure below the gRPC status layer.
    Transport(TransportErrorKind),
    /// Per-call deadline exceeded before the exchange finished.
    Timeout,
    /// Run cancellation interrupted the call in flight.
    Canceled,
}

impl CallStatus {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, CallStatus::Ok)
    }

    /// Stable string form used as the per-status breakdown key.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            CallStatus::Ok => "ok".to_string(),
            CallStatus::Grpc(code) => format!("grpc_status:{code}"),
            CallStatus::Transport(kind) => format!("transport:{kind}"),
            CallStatus::Timeout => "timeout".to_string(),
            CallStatus::Canceled => "canceled".to_string(),
        }
    }
}

/// One measured call.
#[derive(Debug, Clone)]
pub struct CallResult {
    /// Dispatch sequence number, 1-based and globally contiguous.
    pub seq: u64,
    /// 1-based id of the worker that performed the call.
    pub worker: u64,
    /// Dispatch time as an offset from the run start.
    pub offset: Duration,
    pub elapsed: Duration,
    pub status: CallStatus,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Response messages read; 1 for unary and client-streaming shapes.
    pub messages_received: u64,
}

/// Welford's online mean/variance with running min/max.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WelfordAgg {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl WelfordAgg {
    pub(crate) fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub(crate) fn record(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    pub(crate) fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    /// Sample standard deviation.
    pub(crate) fn stdev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    pub(crate) fn min(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.min }
    }

    pub(crate) fn max(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.max }
    }
}

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    /// Stop condition (call budget or duration) reached.
    Completed,
    /// Stopped early through the cancel token.
    Cancelled,
}

/// Latency aggregates in milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencySummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stdev: f64,
}

/// Ladder of latency percentiles in milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentileLadder {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
}

/// Aggregates over the per-interval throughput samples taken by the
/// progress ticker.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalRps {
    pub avg: f64,
    pub stdev: f64,
    pub max: f64,
}

/// Final aggregate of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    /// Wall-clock time from run start to the last worker joining.
    pub duration: Duration,
    pub total_calls: u64,
    pub ok_calls: u64,
    /// Remote (gRPC status) plus transport failures.
    pub failed_calls: u64,
    pub timeout_calls: u64,
    pub canceled_calls: u64,
    /// Share of recorded calls that did not complete `Ok`.
    pub error_rate: f64,
    /// Breakdown by `CallStatus::key()`, sorted by key.
    pub count_by_status: Vec<(String, u64)>,
    pub latency_ms: LatencySummary,
    pub percentiles_ms: PercentileLadder,
    /// Latency at each whole percentile 1..=99, in milliseconds.
    pub distribution_ms: Vec<(u8, f64)>,
    /// Whole-run throughput, `total_calls / duration`.
    pub rps: f64,
    pub interval_rps: IntervalRps,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Per-call records ordered by sequence number, capped at the configured
    /// detail limit.
    pub details: Vec<CallResult>,
}

/// Thread-safe run aggregator. `record` is callable from every worker in any
/// order; `finalize` is called once after all workers have joined.
#[derive(Debug)]
pub struct RunStats {
    calls: AtomicU64,
    ok: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    canceled: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    status_counts: Mutex<AHashMap<String, u64>>,
    // Microseconds; three significant figures keeps percentile error under
    // 0.1% across the 1us..60s range.
    latency_us: Mutex<Histogram<u64>>,
    latency_ms: Mutex<WelfordAgg>,
    rps_samples: Mutex<WelfordAgg>,
    details: Mutex<Vec<CallResult>>,
    detail_cap: usize,
}

impl RunStats {
    #[must_use]
    pub fn new(detail_cap: usize) -> Self {
        let latency_us = Histogram::new_with_bounds(1, 60_000_000, 3)
            .unwrap_or_else(|err| panic!("histogram bounds are static: {err}"));

        Self {
            calls: AtomicU64::new(0),
            ok: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            canceled: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            status_counts: Mutex::new(AHashMap::new()),
            latency_us: Mutex::new(latency_us),
            latency_ms: Mutex::new(WelfordAgg::new()),
            rps_samples: Mutex::new(WelfordAgg::new()),
            details: Mutex::new(Vec::new()),
            detail_cap,
        }
    }

    pub fn record(&self, result: CallResult) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(result.bytes_sent, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(result.bytes_received, Ordering::Relaxed);

        match result.status {
            CallStatus::Ok => self.ok.fetch_add(1, Ordering::Relaxed),
            CallStatus::Grpc(_) | CallStatus::Transport(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed)
            }
            CallStatus::Timeout => self.timeouts.fetch_add(1, Ordering::Relaxed),
            CallStatus::Canceled => self.canceled.fetch_add(1, Ordering::Relaxed),
        };

        {
            let mut counts = lock(&self.status_counts);
            *counts.entry(result.status.key()).or_insert(0) += 1;
        }

        // A canceled call's elapsed covers an aborted exchange, not a
        // completed one, so it stays out of the latency aggregates.
        if result.status != CallStatus::Canceled {
            let us = u64::try_from(result.elapsed.as_micros())
                .unwrap_or(u64::MAX)
                .clamp(1, 60_000_000);
            let _ = lock(&self.latency_us).record(us);
            lock(&self.latency_ms).record(result.elapsed.as_secs_f64() * 1000.0);
        }

        let mut details = lock(&self.details);
        if details.len() < self.detail_cap {
            details.push(result);
        }
    }

    /// Feeds one per-interval throughput sample from the progress ticker.
    pub fn record_rps_sample(&self, rps: f64) {
        lock(&self.rps_samples).record(rps);
    }

    pub fn total(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn ok(&self) -> u64 {
        self.ok.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn canceled(&self) -> u64 {
        self.canceled.load(Ordering::Relaxed)
    }

    /// Latency aggregates over everything recorded so far, for live
    /// progress reporting.
    pub fn latency_snapshot_ms(&self) -> LatencySummary {
        let agg = lock(&self.latency_ms);
        LatencySummary {
            min: agg.min(),
            max: agg.max(),
            mean: agg.mean(),
            stdev: agg.stdev(),
        }
    }

    pub fn finalize(&self, elapsed: Duration, status: RunStatus) -> RunReport {
        let total = self.total();
        let ok = self.ok();
        let failed = self.failed();
        let timeouts = self.timeouts();
        let canceled = self.canceled();

        let mut count_by_status: Vec<(String, u64)> = lock(&self.status_counts)
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        count_by_status.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let latency_ms = self.latency_snapshot_ms();

        let (percentiles_ms, distribution_ms) = {
            let hist = lock(&self.latency_us);
            let at = |q: f64| hist.value_at_quantile(q) as f64 / 1000.0;
            let percentiles = PercentileLadder {
                p50: at(0.50),
                p75: at(0.75),
                p90: at(0.90),
                p95: at(0.95),
                p99: at(0.99),
                p999: at(0.999),
            };
            let distribution = (1u8..=99)
                .map(|p| (p, at(f64::from(p) / 100.0)))
                .collect();
            (percentiles, distribution)
        };

        let interval_rps = {
            let samples = lock(&self.rps_samples);
            if samples.count() == 0 {
                IntervalRps::default()
            } else {
                IntervalRps {
                    avg: samples.mean(),
                    stdev: samples.stdev(),
                    max: samples.max(),
                }
            }
        };

        let secs = elapsed.as_secs_f64();
        let rps = if secs > 0.0 { total as f64 / secs } else { 0.0 };
        let error_rate = if total > 0 {
            (total - ok) as f64 / total as f64
        } else {
            0.0
        };

        let mut details = std::mem::take(&mut *lock(&self.details));
        details.sort_unstable_by_key(|r| r.seq);

        RunReport {
            status,
            duration: elapsed,
            total_calls: total,
            ok_calls: ok,
            failed_calls: failed,
            timeout_calls: timeouts,
            canceled_calls: canceled,
            error_rate,
            count_by_status,
            latency_ms,
            percentiles_ms,
            distribution_ms,
            rps,
            interval_rps,
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            details,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{CallResult, CallStatus, RunStats, RunStatus, WelfordAgg};
    use crate::grpc::TransportErrorKind;

    fn result(seq: u64, elapsed_ms: u64, status: CallStatus) -> CallResult {
        CallResult {
            seq,
            worker: 1,
            offset: Duration::ZERO,
            elapsed: Duration::from_millis(elapsed_ms),
            status,
            bytes_sent: 10,
            bytes_received: 20,
            messages_received: 1,
        }
    }

    #[test]
    fn welford_matches_two_pass_computation() {
        // Agreement from small to large sample counts, with deterministic
        // pseudo-random samples from a small LCG.
        for count in [100u64, 10_000, 1_000_000] {
            let mut state: u64 = 12345;
            let samples: Vec<f64> = (0..count)
                .map(|_| {
                    state = state
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    (state >> 33) as f64 / 1000.0
                })
                .collect();

            let mut agg = WelfordAgg::new();
            for s in &samples {
                agg.record(*s);
            }

            let n = samples.len() as f64;
            let mean = samples.iter().sum::<f64>() / n;
            let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);

            assert!((agg.mean() - mean).abs() / mean < 1e-6, "mean at n={count}");
            assert!(
                (agg.stdev() - var.sqrt()).abs() / var.sqrt() < 1e-6,
                "stdev at n={count}"
            );
            let expected_min = samples.iter().copied().fold(f64::INFINITY, f64::min);
            let expected_max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(agg.min(), expected_min);
            assert_eq!(agg.max(), expected_max);
        }
    }

    #[test]
    fn finalize_computes_throughput_and_latency() {
        let stats = RunStats::new(1000);
        for seq in 1..=5 {
            stats.record(result(seq, 10, CallStatus::Ok));
        }

        let report = stats.finalize(Duration::from_millis(50), RunStatus::Completed);

        assert_eq!(report.total_calls, 5);
        assert_eq!(report.ok_calls, 5);
        assert_eq!(report.error_rate, 0.0);
        assert!((report.rps - 100.0).abs() < 1e-6);
        assert!((report.latency_ms.mean - 10.0).abs() < 0.1);
        assert!((report.percentiles_ms.p50 - 10.0).abs() < 0.1);
        assert_eq!(report.bytes_sent, 50);
        assert_eq!(report.bytes_received, 100);
        assert_eq!(report.details.len(), 5);
        assert_eq!(report.count_by_status, vec![("ok".to_string(), 5)]);
    }

    #[test]
    fn status_breakdown_and_error_rate() {
        let stats = RunStats::new(100);
        stats.record(result(1, 5, CallStatus::Ok));
        stats.record(result(2, 5, CallStatus::Grpc(13)));
        stats.record(result(3, 5, CallStatus::Grpc(13)));
        stats.record(result(4, 5, CallStatus::Timeout));
        stats.record(result(5, 5, CallStatus::Canceled));
        stats.record(result(
            6,
            5,
            CallStatus::Transport(TransportErrorKind::ChannelNotReady),
        ));

        let report = stats.finalize(Duration::from_secs(1), RunStatus::Cancelled);

        assert_eq!(report.total_calls, 6);
        assert_eq!(report.ok_calls, 1);
        assert_eq!(report.failed_calls, 3);
        assert_eq!(report.timeout_calls, 1);
        assert_eq!(report.canceled_calls, 1);
        assert!((report.error_rate - 5.0 / 6.0).abs() < 1e-9);
        assert_eq!(
            report.count_by_status,
            vec![
                ("canceled".to_string(), 1),
                ("grpc_status:13".to_string(), 2),
                ("ok".to_string(), 1),
                ("timeout".to_string(), 1),
                ("transport:channel_not_ready".to_string(), 1),
            ]
        );
        assert_eq!(report.status, RunStatus::Cancelled);
    }

    #[test]
    fn details_are_capped_and_ordered() {
        let stats = RunStats::new(3);
        // Out-of-order arrival.
        for seq in [2, 1, 3, 4, 5] {
            stats.record(result(seq, 1, CallStatus::Ok));
        }

        let report = stats.finalize(Duration::from_secs(1), RunStatus::Completed);

        assert_eq!(report.total_calls, 5);
        let seqs: Vec<u64> = report.details.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn canceled_calls_stay_out_of_latency() {
        let stats = RunStats::new(10);
        stats.record(result(1, 10, CallStatus::Ok));
        stats.record(result(2, 500, CallStatus::Canceled));

        let report = stats.finalize(Duration::from_secs(1), RunStatus::Cancelled);

        assert!(report.latency_ms.max < 100.0);
        assert_eq!(report.canceled_calls, 1);
    }

    #[test]
    fn interval_rps_samples_aggregate() {
        let stats = RunStats::new(0);
        for rps in [90.0, 100.0, 110.0] {
            stats.record_rps_sample(rps);
        }

        let report = stats.finalize(Duration::from_secs(3), RunStatus::Completed);

        assert!((report.interval_rps.avg - 100.0).abs() < 1e-9);
        assert!((report.interval_rps.max - 110.0).abs() < 1e-9);
        assert!((report.interval_rps.stdev - 10.0).abs() < 1e-9);
    }
}
