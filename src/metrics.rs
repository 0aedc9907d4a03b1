//! Process-wide counters exposed on `/metrics` in Prometheus text format.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Latency bucket upper bounds in milliseconds.  Analyses are dominated by
/// page loads, so the range reaches well past the default `maxWait`.
const LATENCY_BUCKETS_MS: [u64; 11] = [
    50, 100, 250, 500, 1000, 2500, 5000, 10_000, 20_000, 30_000, 60_000,
];

/// Final classification of one `/analyze` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    InvalidInput,
    EngineFailure,
    Unavailable,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::InvalidInput => "invalid_input",
            Outcome::EngineFailure => "engine_failure",
            Outcome::Unavailable => "unavailable",
        }
    }

    const ALL: [Outcome; 4] = [
        Outcome::Success,
        Outcome::InvalidInput,
        Outcome::EngineFailure,
        Outcome::Unavailable,
    ];
}

#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Inner>,
}

struct Inner {
    requests_total: AtomicU64,
    outcomes: [AtomicU64; 4],
    in_flight: AtomicU64,
    idle: Notify,
    sessions_total: AtomicU64,
    cleanup_failures_total: AtomicU64,
    hist_counts: Vec<AtomicU64>,
    hist_sum_ms: AtomicU64,
    hist_count: AtomicU64,
    process_start_epoch: f64,
    process_start_instant: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let start_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                requests_total: AtomicU64::new(0),
                outcomes: Default::default(),
                in_flight: AtomicU64::new(0),
                idle: Notify::new(),
                sessions_total: AtomicU64::new(0),
                cleanup_failures_total: AtomicU64::new(0),
                hist_counts: LATENCY_BUCKETS_MS.iter().map(|_| AtomicU64::new(0)).collect(),
                hist_sum_ms: AtomicU64::new(0),
                hist_count: AtomicU64::new(0),
                process_start_epoch: start_time.as_secs_f64(),
                process_start_instant: Instant::now(),
            }),
        }
    }

    pub fn observe(&self, outcome: Outcome, latency: Duration) {
        let inner = &self.inner;
        inner.requests_total.fetch_add(1, Ordering::Relaxed);
        inner.outcomes[outcome as usize].fetch_add(1, Ordering::Relaxed);

        let latency_ms = latency.as_millis() as u64;
        inner.hist_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        inner.hist_count.fetch_add(1, Ordering::Relaxed);
        // first bucket >= value
        for (idx, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
            if latency_ms <= *ub {
                inner.hist_counts[idx].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    /// Count one engine session as live until the returned guard drops.
    pub fn session_started(&self) -> InFlightGuard {
        self.inner.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn cleanup_failed(&self) {
        self.inner
            .cleanup_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> u64 {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Resolves once no engine session is live, including sessions whose
    /// release was handed to a background task.
    pub async fn sessions_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn sessions_total(&self) -> u64 {
        self.inner.sessions_total.load(Ordering::Relaxed)
    }

    pub fn cleanup_failures_total(&self) -> u64 {
        self.inner.cleanup_failures_total.load(Ordering::Relaxed)
    }

    pub fn outcome_total(&self, outcome: Outcome) -> u64 {
        self.inner.outcomes[outcome as usize].load(Ordering::Relaxed)
    }

    pub fn render(&self) -> String {
        let inner = &self.inner;
        let mut buf = String::new();
        writeln!(
            &mut buf,
            "# HELP cultivate_requests_total Total analyze requests processed\n# TYPE cultivate_requests_total counter"
        )
        .ok();
        writeln!(
            &mut buf,
            "cultivate_requests_total {}",
            inner.requests_total.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP cultivate_outcomes_total Analyze requests by outcome\n# TYPE cultivate_outcomes_total counter"
        )
        .ok();
        for outcome in Outcome::ALL {
            writeln!(
                &mut buf,
                "cultivate_outcomes_total{{outcome=\"{}\"}} {}",
                outcome.label(),
                self.outcome_total(outcome)
            )
            .ok();
        }
        writeln!(
            &mut buf,
            "# HELP cultivate_sessions_total Engine sessions constructed\n# TYPE cultivate_sessions_total counter"
        )
        .ok();
        writeln!(&mut buf, "cultivate_sessions_total {}", self.sessions_total()).ok();
        writeln!(
            &mut buf,
            "# HELP cultivate_sessions_in_flight Engine sessions not yet destroyed\n# TYPE cultivate_sessions_in_flight gauge"
        )
        .ok();
        writeln!(&mut buf, "cultivate_sessions_in_flight {}", self.in_flight()).ok();
        writeln!(
            &mut buf,
            "# HELP cultivate_cleanup_failures_total Engine destroy calls that failed\n# TYPE cultivate_cleanup_failures_total counter"
        )
        .ok();
        writeln!(
            &mut buf,
            "cultivate_cleanup_failures_total {}",
            self.cleanup_failures_total()
        )
        .ok();

        writeln!(
            &mut buf,
            "# HELP cultivate_request_latency_ms Analyze latency histogram milliseconds\n# TYPE cultivate_request_latency_ms histogram"
        )
        .ok();
        let count = inner.hist_count.load(Ordering::Relaxed);
        let mut cumulative: u64 = 0;
        for (i, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
            cumulative += inner.hist_counts[i].load(Ordering::Relaxed);
            writeln!(
                &mut buf,
                "cultivate_request_latency_ms_bucket{{le=\"{}\"}} {}",
                ub, cumulative
            )
            .ok();
        }
        writeln!(
            &mut buf,
            "cultivate_request_latency_ms_bucket{{le=\"+Inf\"}} {}",
            count
        )
        .ok();
        writeln!(
            &mut buf,
            "cultivate_request_latency_ms_sum {}",
            inner.hist_sum_ms.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(&mut buf, "cultivate_request_latency_ms_count {}", count).ok();

        writeln!(
            &mut buf,
            "# HELP cultivate_build_info Build information\n# TYPE cultivate_build_info gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "cultivate_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP cultivate_process_start_time_seconds Process start time (Unix epoch seconds)\n# TYPE cultivate_process_start_time_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "cultivate_process_start_time_seconds {}",
            inner.process_start_epoch
        )
        .ok();
        writeln!(
            &mut buf,
            "# HELP cultivate_process_uptime_seconds Process uptime seconds\n# TYPE cultivate_process_uptime_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "cultivate_process_uptime_seconds {}",
            inner.process_start_instant.elapsed().as_secs_f64()
        )
        .ok();
        buf
    }
}

/// Decrements the in-flight gauge on drop and wakes idle waiters when it
/// reaches zero.
pub struct InFlightGuard {
    inner: Arc<Inner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
