use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Hands out 1-based call sequence numbers from a single shared counter, so
/// dispatch order is globally consistent across workers.
///
/// With a call budget the gate closes after exactly that many tickets; with a
/// deadline it closes once the deadline passes. Both may be set, whichever
/// trips first wins. With neither, the gate stays open until cancellation
/// stops the workers.
#[derive(Debug)]
pub struct DispatchGate {
    dispatched: AtomicU64,
    total: Option<u64>,
    deadline: OnceLock<Instant>,
    duration: Option<Duration>,
}

impl DispatchGate {
    #[must_use]
    pub fn new(total: Option<u64>, duration: Option<Duration>) -> Self {
        Self {
            dispatched: AtomicU64::new(0),
            total,
            deadline: OnceLock::new(),
            duration,
        }
    }

    /// Arms the deadline relative to the run start. Without this the
    /// duration bound never trips.
    pub fn start_at(&self, started: Instant) {
        if let Some(duration) = self.duration {
            let _ = self.deadline.set(started + duration);
        }
    }

    /// Claims the next sequence number, or `None` once the gate is closed.
    ///
    /// Overshoot claims past the call budget return `None` without being
    /// observable, so issued sequence numbers are contiguous `1..=N`.
    pub fn next(&self) -> Option<u64> {
        if let Some(deadline) = self.deadline.get()
            && Instant::now() >= *deadline
        {
            return None;
        }

        let idx = self.dispatched.fetch_add(1, Ordering::Relaxed);
        match self.total {
            Some(total) if idx >= total => None,
            _ => Some(idx + 1),
        }
    }
}
