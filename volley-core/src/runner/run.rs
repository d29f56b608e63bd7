use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use super::config::RunConfig;
use super::error::{Error, Result};
use super::gate::DispatchGate;
use super::pacer::RateLimiter;
use super::progress::{LiveStats, ProgressFn, ProgressUpdate};
use super::signal::CancelToken;
use super::stats::{CallResult, RunReport, RunStats, RunStatus};

/// One dispatched call: its global sequence number, the worker performing
/// it, and the dispatch offset from run start.
#[derive(Debug, Clone, Copy)]
pub struct CallTicket {
    pub seq: u64,
    pub worker: u64,
    pub offset: Duration,
}

/// Runs the worker pool to completion and aggregates every result.
///
/// The pool is generic over the per-call handler: the gRPC glue passes the
/// invoker, tests pass plain closures. A handler `Err` is fatal, it cancels
/// the whole pool and surfaces as the run's error; per-call failures must
/// come back as `Ok(CallResult)` data instead.
pub async fn run_pool<F, Fut, E>(
    config: &RunConfig,
    handler: F,
    cancel: Arc<CancelToken>,
    progress: Option<ProgressFn>,
) -> Result<RunReport>
where
    F: Fn(CallTicket) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<CallResult, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    config.validate()?;

    let stats = Arc::new(RunStats::new(config.detail_cap));
    let gate = Arc::new(DispatchGate::new(config.total_calls, config.duration));
    let limiter = Arc::new(RateLimiter::new(config.rate_plan()));
    let fatal: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));

    let started = Instant::now();
    gate.start_at(started);
    limiter.start_at(started);

    let mut workers = Vec::with_capacity(config.workers as usize);
    for worker in 1..=config.workers {
        let handler = handler.clone();
        let cancel = Arc::clone(&cancel);
        let gate = Arc::clone(&gate);
        let limiter = Arc::clone(&limiter);
        let stats = Arc::clone(&stats);
        let fatal = Arc::clone(&fatal);

        workers.push(tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }

                tokio::select! {
                    () = limiter.acquire() => {}
                    () = cancel.cancelled() => break,
                }

                // Claim the sequence number only once the call will actually
                // be made, so issued numbers stay contiguous.
                let Some(seq) = gate.next() else { break };
                let ticket = CallTicket {
                    seq,
                    worker,
                    offset: started.elapsed(),
                };

                match handler(ticket).await {
                    Ok(result) => stats.record(result),
                    Err(err) => {
                        {
                            let mut slot = fatal
                                .lock()
                                .unwrap_or_else(|poisoned| poisoned.into_inner());
                            if slot.is_none() {
                                *slot = Some(Error::Worker(err.to_string()));
                            }
                        }
                        cancel.cancel();
                        break;
                    }
                }
            }
        }));
    }

    // The ticker always runs: its interval samples feed the report's rps
    // aggregates whether or not a callback is installed.
    let ticker = {
        let stats = Arc::clone(&stats);
        let interval = config.progress_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick resolves immediately.
            ticker.tick().await;

            let mut last_total = 0u64;
            let mut tick = 0u64;
            loop {
                ticker.tick().await;
                tick += 1;

                let total = stats.total();
                let rps_now = (total - last_total) as f64 / interval.as_secs_f64();
                last_total = total;
                stats.record_rps_sample(rps_now);

                if let Some(progress) = &progress {
                    progress(ProgressUpdate {
                        tick,
                        elapsed: started.elapsed(),
                        stats: LiveStats {
                            total_calls: total,
                            ok_calls: stats.ok(),
                            failed_calls: stats.failed(),
                            timeout_calls: stats.timeouts(),
                            canceled_calls: stats.canceled(),
                            rps_now,
                            latency_ms: stats.latency_snapshot_ms(),
                        },
                    });
                }
            }
        })
    };

    for handle in workers {
        handle.await?;
    }

    // Stop the ticker after the final join; finalize never races record.
    ticker.abort();
    let _ = ticker.await;

    let elapsed = started.elapsed();

    if let Some(err) = fatal
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
    {
        return Err(err);
    }

    let status = if cancel.is_cancelled() {
        RunStatus::Cancelled
    } else {
        RunStatus::Completed
    };
    Ok(stats.finalize(elapsed, status))
}
