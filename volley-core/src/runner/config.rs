use std::time::Duration;

use super::error::{Error, Result};
use super::pacer::{RatePlan, RateRamp};

/// Run shape: how many workers, how much load, for how long.
///
/// `total_calls` and `duration` may both be set (whichever trips first stops
/// the run) or both unset (the run only stops on cancellation).
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Concurrent workers (C). Each worker drives one call at a time.
    pub workers: u64,
    /// Total call budget (N), shared across all workers.
    pub total_calls: Option<u64>,
    pub duration: Option<Duration>,
    /// Aggregate target rate in calls/sec. `None` runs unpaced.
    pub rate: Option<u64>,
    pub ramp: Option<RateRamp>,
    pub call_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    /// Connections to open (K). Worker `i` uses connection `i mod K`.
    pub connections: usize,
    /// Messages per client/bidi streaming call.
    pub stream_messages: Option<usize>,
    /// Per-call records kept for the report; recording stops at the cap,
    /// aggregation never does.
    pub detail_cap: usize,
    pub progress_interval: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            total_calls: None,
            duration: None,
            rate: None,
            ramp: None,
            call_timeout: None,
            connect_timeout: None,
            connections: 1,
            stream_messages: None,
            detail_cap: 0,
            progress_interval: Duration::from_secs(1),
        }
    }
}

impl RunConfig {
    /// Rejects invalid combinations before any worker starts.
    pub fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            return Err(Error::InvalidWorkers);
        }
        if self.connections < 1 || self.connections as u64 > self.workers {
            return Err(Error::InvalidConnections);
        }
        if self.total_calls == Some(0) {
            return Err(Error::InvalidCalls);
        }
        if self.duration == Some(Duration::ZERO) {
            return Err(Error::InvalidDuration);
        }
        if self.rate == Some(0) {
            return Err(Error::InvalidRate);
        }
        if self.stream_messages == Some(0) {
            return Err(Error::InvalidStreamMessages);
        }
        if let Some(ramp) = self.ramp {
            if self.rate.is_none() {
                return Err(Error::RampWithoutRate);
            }
            if ramp.interval == Duration::ZERO {
                return Err(Error::InvalidRampInterval);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn rate_plan(&self) -> RatePlan {
        match (self.rate, self.ramp) {
            (Some(rate), Some(ramp)) => RatePlan::ramped(rate, ramp),
            (Some(rate), None) => RatePlan::constant(rate),
            (None, _) => RatePlan::unlimited(),
        }
    }
}
