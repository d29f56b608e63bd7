mod config;
mod error;
mod gate;
mod pacer;
mod progress;
mod run;
mod signal;
mod stats;

pub use config::RunConfig;
pub use error::{Error, Result};
pub use gate::DispatchGate;
pub use pacer::{RateLimiter, RatePlan, RateRamp};
pub use progress::{LiveStats, ProgressFn, ProgressUpdate};
pub use run::{CallTicket, run_pool};
pub use signal::CancelToken;
pub use stats::{
    CallResult, CallStatus, IntervalRps, LatencySummary, PercentileLadder, RunReport, RunStats,
    RunStatus,
};
