//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters/gauges relevant to the gamification pipeline.

use std::sync::Arc;

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
    core::Collector,
};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    awards_dispatched_total: IntCounterVec,
    jobs_total: IntCounterVec,
    jobs_in_flight: IntGaugeVec,
    level_ups_total: IntCounter,
    xp_awarded_total: IntCounter,
    leaderboard_errors_total: IntCounterVec,
    ranking_fallbacks_total: IntCounter,
}

/// Snapshot of selected counters for health reporting and tests.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Awards accepted onto the gamification queue.
    pub awards_enqueued: u64,
    /// Awards dropped because the queue could not be reached.
    pub awards_dropped: u64,
    /// Awards skipped because the caller's role does not earn rewards.
    pub awards_ineligible: u64,
    /// Level-ups applied by the gamification worker.
    pub level_ups_total: u64,
    /// Total XP applied to the ledger.
    pub xp_awarded_total: u64,
    /// Ranking requests served from the ledger instead of the cache.
    pub ranking_fallbacks_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let awards_dispatched_total = IntCounterVec::new(
            Opts::new(
                "pulse_awards_dispatched_total",
                "XP award requests handled by the dispatcher by outcome",
            ),
            &["outcome"],
        )
        .map_err(|source| collector_error("pulse_awards_dispatched_total", source))?;
        let jobs_total = IntCounterVec::new(
            Opts::new("pulse_jobs_total", "Queue jobs processed by queue and status"),
            &["queue", "status"],
        )
        .map_err(|source| collector_error("pulse_jobs_total", source))?;
        let jobs_in_flight = IntGaugeVec::new(
            Opts::new("pulse_jobs_in_flight", "Queue jobs currently being processed"),
            &["queue"],
        )
        .map_err(|source| collector_error("pulse_jobs_in_flight", source))?;
        let level_ups_total = IntCounter::with_opts(Opts::new(
            "pulse_level_ups_total",
            "Level-ups applied to the user ledger",
        ))
        .map_err(|source| collector_error("pulse_level_ups_total", source))?;
        let xp_awarded_total = IntCounter::with_opts(Opts::new(
            "pulse_xp_awarded_total",
            "XP applied to the user ledger",
        ))
        .map_err(|source| collector_error("pulse_xp_awarded_total", source))?;
        let leaderboard_errors_total = IntCounterVec::new(
            Opts::new(
                "pulse_leaderboard_errors_total",
                "Leaderboard cache failures by operation",
            ),
            &["operation"],
        )
        .map_err(|source| collector_error("pulse_leaderboard_errors_total", source))?;
        let ranking_fallbacks_total = IntCounter::with_opts(Opts::new(
            "pulse_ranking_fallbacks_total",
            "Ranking requests served by scanning the ledger",
        ))
        .map_err(|source| collector_error("pulse_ranking_fallbacks_total", source))?;

        register(&registry, "pulse_awards_dispatched_total", &awards_dispatched_total)?;
        register(&registry, "pulse_jobs_total", &jobs_total)?;
        register(&registry, "pulse_jobs_in_flight", &jobs_in_flight)?;
        register(&registry, "pulse_level_ups_total", &level_ups_total)?;
        register(&registry, "pulse_xp_awarded_total", &xp_awarded_total)?;
        register(
            &registry,
            "pulse_leaderboard_errors_total",
            &leaderboard_errors_total,
        )?;
        register(
            &registry,
            "pulse_ranking_fallbacks_total",
            &ranking_fallbacks_total,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                awards_dispatched_total,
                jobs_total,
                jobs_in_flight,
                level_ups_total,
                xp_awarded_total,
                leaderboard_errors_total,
                ranking_fallbacks_total,
            }),
        })
    }

    /// Increment the dispatcher counter for the given outcome label.
    pub fn inc_award_dispatch(&self, outcome: &str) {
        self.inner
            .awards_dispatched_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Increment the job counter for a queue and terminal status.
    pub fn inc_job(&self, queue: &str, status: &str) {
        self.inner
            .jobs_total
            .with_label_values(&[queue, status])
            .inc();
    }

    /// Mark a job as started on the given queue.
    pub fn job_started(&self, queue: &str) {
        self.inner.jobs_in_flight.with_label_values(&[queue]).inc();
    }

    /// Mark a job as finished on the given queue.
    pub fn job_finished(&self, queue: &str) {
        self.inner.jobs_in_flight.with_label_values(&[queue]).dec();
    }

    /// Record a level-up.
    pub fn inc_level_up(&self) {
        self.inner.level_ups_total.inc();
    }

    /// Record XP applied to the ledger.
    pub fn add_xp_awarded(&self, xp: u64) {
        self.inner.xp_awarded_total.inc_by(xp);
    }

    /// Increment the leaderboard failure counter.
    pub fn inc_leaderboard_error(&self, operation: &str) {
        self.inner
            .leaderboard_errors_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Increment the ranking fallback counter.
    pub fn inc_ranking_fallback(&self) {
        self.inner.ranking_fallbacks_total.inc();
    }

    /// Current in-flight job count for a queue.
    #[must_use]
    pub fn jobs_in_flight(&self, queue: &str) -> i64 {
        self.inner.jobs_in_flight.with_label_values(&[queue]).get()
    }

    /// Number of jobs recorded for a queue and status.
    #[must_use]
    pub fn jobs(&self, queue: &str, status: &str) -> u64 {
        self.inner
            .jobs_total
            .with_label_values(&[queue, status])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Exposition { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::ExpositionUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let awards = &self.inner.awards_dispatched_total;
        MetricsSnapshot {
            awards_enqueued: awards.with_label_values(&["enqueued"]).get(),
            awards_dropped: awards.with_label_values(&["dropped"]).get(),
            awards_ineligible: awards.with_label_values(&["ineligible"]).get(),
            level_ups_total: self.inner.level_ups_total.get(),
            xp_awarded_total: self.inner.xp_awarded_total.get(),
            ranking_fallbacks_total: self.inner.ranking_fallbacks_total.get(),
        }
    }
}

const fn collector_error(name: &'static str, source: prometheus::Error) -> TelemetryError {
    TelemetryError::metric(name, "built", source)
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::metric(name, "registered", source))
}
