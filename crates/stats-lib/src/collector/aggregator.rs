//! Fan-in and lifecycle control
//!
//! The aggregator is the single owner of all coordination state: which
//! monitors are still active and the output sink. It consumes events from
//! every stream reader and stops when the last monitor finishes or when
//! shutdown is requested, whichever it observes first.

use super::{MonitorEvent, MonitorOutcome};
use crate::calculator;
use crate::error::{PipelineError, SinkError};
use crate::models::{ContainerRef, MonitorState, PlatformTag, RawSnapshot};
use crate::observability::{CollectorMetrics, StructuredLogger};
use crate::sink::{OutputSink, HEADER};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Why the aggregator stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    AllMonitorsDone,
    ShutdownRequested,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllMonitorsDone => f.write_str("all monitors finished"),
            Self::ShutdownRequested => f.write_str("shutdown requested"),
        }
    }
}

/// Totals for one collection run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub records_written: u64,
    pub completed: usize,
    pub failed: usize,
}

/// Merges reader events into the output sink and tracks monitor lifecycle
pub struct Aggregator<S> {
    sink: S,
    human_readable: bool,
    events: mpsc::Receiver<MonitorEvent>,
    monitors: HashMap<String, MonitorState>,
    active: usize,
    metrics: CollectorMetrics,
    logger: StructuredLogger,
}

impl<S: OutputSink> Aggregator<S> {
    /// Create an aggregator expecting one completion per container
    pub fn new(
        sink: S,
        events: mpsc::Receiver<MonitorEvent>,
        containers: &[Arc<ContainerRef>],
    ) -> Self {
        let monitors: HashMap<String, MonitorState> = containers
            .iter()
            .map(|c| (c.id.clone(), MonitorState::Active))
            .collect();
        let active = monitors.len();

        Self {
            sink,
            human_readable: false,
            events,
            monitors,
            active,
            metrics: CollectorMetrics::new(),
            logger: StructuredLogger::new("unknown"),
        }
    }

    pub fn human_readable(mut self, human_readable: bool) -> Self {
        self.human_readable = human_readable;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Number of monitors that have not reported completion yet
    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.active
    }

    /// Write the header, then process events until termination.
    ///
    /// Termination happens exactly once. When shutdown and the final
    /// completion are ready at the same time, either may be picked (the
    /// select is unbiased); the summary's outcome records which one was.
    /// Events still queued at termination are not processed.
    pub async fn run<F>(mut self, shutdown: F) -> Result<RunSummary, PipelineError>
    where
        F: Future<Output = ()>,
    {
        self.sink.write_header(&HEADER)?;
        self.sink.flush()?;
        self.metrics.set_monitors_active(self.active);

        tokio::pin!(shutdown);
        let mut records_written = 0u64;

        let outcome = if self.active == 0 {
            info!("No containers to monitor");
            RunOutcome::AllMonitorsDone
        } else {
            loop {
                tokio::select! {
                    _ = &mut shutdown => {
                        info!(active = self.active, "Shutdown requested, stopping aggregation");
                        break RunOutcome::ShutdownRequested;
                    }
                    event = self.events.recv() => match event {
                        Some(MonitorEvent::SnapshotArrived { container, platform, snapshot }) => {
                            self.write_record(&container, platform, &snapshot)?;
                            records_written += 1;
                        }
                        Some(MonitorEvent::MonitorDone { container_id, outcome }) => {
                            if self.finish_monitor(&container_id, &outcome) == 0 {
                                break RunOutcome::AllMonitorsDone;
                            }
                        }
                        None => {
                            // Readers always report completion unless they panicked
                            warn!(active = self.active, "All stream readers exited without reporting completion");
                            break RunOutcome::AllMonitorsDone;
                        }
                    }
                }
            }
        };

        Ok(self.summary(outcome, records_written))
    }

    fn write_record(
        &mut self,
        container: &ContainerRef,
        platform: PlatformTag,
        snapshot: &RawSnapshot,
    ) -> Result<(), SinkError> {
        let start = Instant::now();
        let record = calculator::calculate(container, platform, snapshot);

        self.sink.write(&record, self.human_readable)?;
        self.sink.flush()?;

        self.metrics.inc_records_written();
        self.metrics
            .observe_sink_write(start.elapsed().as_secs_f64());
        Ok(())
    }

    /// Record a monitor's completion; returns the remaining active count
    fn finish_monitor(&mut self, container_id: &str, outcome: &MonitorOutcome) -> usize {
        match self.monitors.get_mut(container_id) {
            Some(state) if *state == MonitorState::Active => {
                *state = outcome.state();
                self.active -= 1;
                self.metrics.set_monitors_active(self.active);
                self.logger
                    .log_monitor_done(container_id, outcome, self.active);
            }
            Some(state) => {
                debug!(container_id = %container_id, state = ?state, "Ignoring repeated completion");
            }
            None => {
                warn!(container_id = %container_id, "Ignoring completion for unknown container");
            }
        }
        self.active
    }

    fn summary(&self, outcome: RunOutcome, records_written: u64) -> RunSummary {
        let count = |wanted: MonitorState| {
            self.monitors
                .values()
                .filter(|&&state| state == wanted)
                .count()
        };

        RunSummary {
            outcome,
            records_written,
            completed: count(MonitorState::Completed),
            failed: count(MonitorState::Failed),
        }
    }
}
