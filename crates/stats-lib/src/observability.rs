//! Observability infrastructure for the stats collector
//!
//! Provides:
//! - Prometheus metrics (records written, decode and feed errors, active monitors, sink latency)
//! - Structured logging of lifecycle events with tracing

use crate::collector::{MonitorOutcome, RunSummary};
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for sink write latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CollectorMetricsInner> = OnceLock::new();

struct CollectorMetricsInner {
    records_written: IntCounter,
    decode_errors: IntCounter,
    feed_errors: IntCounter,
    monitors_active: IntGauge,
    sink_write_seconds: Histogram,
}

impl CollectorMetricsInner {
    fn new() -> Self {
        Self {
            records_written: register_int_counter!(
                "stats_dump_records_written_total",
                "Total number of metric records written to the output sink"
            )
            .expect("Failed to register records_written"),

            decode_errors: register_int_counter!(
                "stats_dump_decode_errors_total",
                "Total number of stats records that could not be decoded"
            )
            .expect("Failed to register decode_errors"),

            feed_errors: register_int_counter!(
                "stats_dump_feed_errors_total",
                "Total number of stats feeds that failed to open or broke mid-stream"
            )
            .expect("Failed to register feed_errors"),

            monitors_active: register_int_gauge!(
                "stats_dump_monitors_active",
                "Number of container monitors still streaming"
            )
            .expect("Failed to register monitors_active"),

            sink_write_seconds: register_histogram!(
                "stats_dump_sink_write_seconds",
                "Time spent writing and flushing one record",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register sink_write_seconds"),
        }
    }
}

/// Collector metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct CollectorMetrics {
    _private: (),
}

impl Default for CollectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CollectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CollectorMetricsInner {
        GLOBAL_METRICS.get_or_init(CollectorMetricsInner::new)
    }

    pub fn inc_records_written(&self) {
        self.inner().records_written.inc();
    }

    pub fn inc_decode_errors(&self) {
        self.inner().decode_errors.inc();
    }

    pub fn inc_feed_errors(&self) {
        self.inner().feed_errors.inc();
    }

    pub fn set_monitors_active(&self, count: usize) {
        self.inner().monitors_active.set(count as i64);
    }

    pub fn observe_sink_write(&self, duration_secs: f64) {
        self.inner().sink_write_seconds.observe(duration_secs);
    }

    pub fn records_written(&self) -> u64 {
        self.inner().records_written.get()
    }

    pub fn decode_errors(&self) -> u64 {
        self.inner().decode_errors.get()
    }

    pub fn feed_errors(&self) -> u64 {
        self.inner().feed_errors.get()
    }
}

/// Structured logger for collector lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    endpoint: String,
}

impl StructuredLogger {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Log collector startup once containers are known
    pub fn log_startup(&self, version: &str, containers: usize, streaming: bool) {
        info!(
            event = "collector_started",
            endpoint = %self.endpoint,
            version = %version,
            containers = containers,
            streaming = streaming,
            "Stats collector started"
        );
    }

    /// Log a container monitor reaching its terminal state
    pub fn log_monitor_done(&self, container_id: &str, outcome: &MonitorOutcome, remaining: usize) {
        match outcome {
            MonitorOutcome::Completed => {
                info!(
                    event = "monitor_done",
                    endpoint = %self.endpoint,
                    container_id = %container_id,
                    remaining = remaining,
                    "Stats feed ended"
                );
            }
            MonitorOutcome::Failed { reason } => {
                warn!(
                    event = "monitor_failed",
                    endpoint = %self.endpoint,
                    container_id = %container_id,
                    reason = %reason,
                    remaining = remaining,
                    "Stats feed failed"
                );
            }
        }
    }

    /// Log collector shutdown with the run totals
    pub fn log_shutdown(&self, summary: &RunSummary) {
        info!(
            event = "collector_shutdown",
            endpoint = %self.endpoint,
            reason = %summary.outcome,
            records_written = summary.records_written,
            monitors_completed = summary.completed,
            monitors_failed = summary.failed,
            "Stats collector shutting down"
        );
    }
}
