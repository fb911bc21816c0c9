//! Workload driver that exercises a limiter from concurrent tasks.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::WorkloadConfig;
use crate::ratelimit::RateLimiter;

/// Outcome of driving one limiter with a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub limiter: String,
    pub algorithm: String,
    pub requests: u64,
    pub allowed: u64,
    pub denied: u64,
    /// Units consumed by allowed requests
    pub units_admitted: u64,
    pub elapsed_ms: u64,
}

impl SimulationReport {
    /// Fraction of requests that were allowed.
    pub fn admission_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.allowed as f64 / self.requests as f64
        }
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<16} {:<15} requests={:<6} allowed={:<6} denied={:<6} units={:<6} rate={:.1}% elapsed={}ms",
            self.limiter,
            self.algorithm,
            self.requests,
            self.allowed,
            self.denied,
            self.units_admitted,
            self.admission_rate() * 100.0,
            self.elapsed_ms
        )
    }
}

#[derive(Default)]
struct Tally {
    allowed: AtomicU64,
    denied: AtomicU64,
    units: AtomicU64,
}

/// Drive `limiter` with `workload` and stop it when the run ends.
///
/// Each worker calls `allow(request_size)` once per interval until the
/// workload duration has elapsed.
pub async fn run(
    name: &str,
    algorithm: &str,
    limiter: Arc<dyn RateLimiter>,
    workload: &WorkloadConfig,
) -> SimulationReport {
    info!(
        limiter = %name,
        algorithm = %algorithm,
        workers = workload.workers,
        request_size = workload.request_size,
        duration_ms = workload.duration_ms,
        "Starting workload"
    );

    let tally = Arc::new(Tally::default());
    let started = Instant::now();
    let deadline = started + workload.duration();

    let mut handles = Vec::with_capacity(workload.workers);
    for worker in 0..workload.workers {
        let limiter = Arc::clone(&limiter);
        let tally = Arc::clone(&tally);
        let interval = workload.request_interval();
        let request_size = workload.request_size;

        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(started, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                let tick = ticker.tick().await;
                if tick >= deadline {
                    break;
                }

                if limiter.allow(request_size) {
                    tally.allowed.fetch_add(1, Ordering::Relaxed);
                    tally.units.fetch_add(request_size as u64, Ordering::Relaxed);
                } else {
                    tally.denied.fetch_add(1, Ordering::Relaxed);
                }
            }
            debug!(worker, "Worker finished");
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Workload task failed");
        }
    }

    limiter.stop();

    let allowed = tally.allowed.load(Ordering::Relaxed);
    let denied = tally.denied.load(Ordering::Relaxed);
    let report = SimulationReport {
        limiter: name.to_string(),
        algorithm: algorithm.to_string(),
        requests: allowed + denied,
        allowed,
        denied,
        units_admitted: tally.units.load(Ordering::Relaxed),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    info!(
        limiter = %name,
        allowed = report.allowed,
        denied = report.denied,
        "Workload finished"
    );
    report
}
