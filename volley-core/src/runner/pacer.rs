use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Stepwise rate ramp: the effective rate starts at `start` calls/sec and
/// rises by `step` every `interval` until it reaches the configured target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRamp {
    pub start: u64,
    pub step: u64,
    pub interval: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RatePlan {
    target: Option<u64>,
    ramp: Option<RateRamp>,
}

impl RatePlan {
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn constant(rate: u64) -> Self {
        Self {
            target: Some(rate),
            ramp: None,
        }
    }

    #[must_use]
    pub fn ramped(target: u64, ramp: RateRamp) -> Self {
        Self {
            target: Some(target),
            ramp: Some(ramp),
        }
    }

    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.target.is_none()
    }

    /// Effective rate at `elapsed` since the run started, `None` when
    /// unlimited. Never returns a rate of zero.
    #[must_use]
    pub fn rate_at(&self, elapsed: Duration) -> Option<u64> {
        let target = self.target?;
        let Some(ramp) = self.ramp else {
            return Some(target.max(1));
        };

        let steps = (elapsed.as_nanos() / ramp.interval.as_nanos().max(1)) as u64;
        let ramped = ramp.start.saturating_add(ramp.step.saturating_mul(steps));
        Some(ramped.min(target).max(1))
    }
}

/// Global rate limiter shared by every worker.
///
/// Admissions are spaced evenly at the current rate by handing each caller
/// the next free time slot. When dispatch falls behind (slow calls, too few
/// workers) the schedule is clamped to now instead of accumulating debt, so
/// a stall is not followed by a burst above the configured rate.
#[derive(Debug)]
pub struct RateLimiter {
    plan: RatePlan,
    started: OnceLock<Instant>,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(plan: RatePlan) -> Self {
        Self {
            plan,
            started: OnceLock::new(),
            next_slot: Mutex::new(None),
        }
    }

    /// Anchors ramp evaluation to the run start.
    pub fn start_at(&self, started: Instant) {
        let _ = self.started.set(started);
    }

    /// Waits until the next call may be dispatched. Unlimited plans return
    /// immediately.
    pub async fn acquire(&self) {
        if self.plan.is_unlimited() {
            return;
        }

        let slot = {
            let mut next = self
                .next_slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            let now = Instant::now();
            let slot = next.filter(|n| *n > now).unwrap_or(now);

            let started = *self.started.get_or_init(|| now);
            let elapsed = slot.saturating_duration_since(started);
            // rate_at never yields zero for a limited plan.
            let rate = self.plan.rate_at(elapsed).unwrap_or(1);
            *next = Some(slot + Duration::from_nanos(1_000_000_000 / rate.max(1)));

            slot
        };

        tokio::time::sleep_until(tokio::time::Instant::from_std(slot)).await;
    }
}
