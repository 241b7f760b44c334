//! Collection run supervisor
//!
//! Discovers containers once, starts one [`StreamReader`] per container,
//! runs the [`Aggregator`] until it terminates, then cancels and drains the
//! readers within a bounded grace period.

use super::{Aggregator, DecodePolicy, RunOutcome, RunSummary, StreamReader};
use crate::daemon::TelemetrySource;
use crate::error::PipelineError;
use crate::models::ContainerRef;
use crate::observability::StructuredLogger;
use crate::sink::OutputSink;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for a collection run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Follow feeds continuously instead of taking one sample (default: true)
    pub streaming: bool,
    /// Format byte sizes and percentages for people (default: false)
    pub human_readable: bool,
    /// What a reader does with an undecodable record (default: skip)
    pub decode_policy: DecodePolicy,
    /// Capacity of the reader to aggregator channel (default: 1024)
    pub channel_capacity: usize,
    /// How long readers get to stop after the aggregator finishes (default: 5 seconds)
    pub shutdown_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            streaming: true,
            human_readable: false,
            decode_policy: DecodePolicy::default(),
            channel_capacity: 1024,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Runs stream readers and the aggregator for one set of containers
pub struct Pipeline {
    source: Arc<dyn TelemetrySource>,
    config: PipelineConfig,
    logger: StructuredLogger,
}

impl Pipeline {
    pub fn new(source: Arc<dyn TelemetrySource>, config: PipelineConfig) -> Self {
        Self {
            source,
            config,
            logger: StructuredLogger::new("unknown"),
        }
    }

    /// List running containers, then collect from all of them.
    ///
    /// Discovery happens once; containers started later are not picked up.
    /// Shutdown during discovery ends the run before anything is written.
    pub async fn run<S, F>(&self, sink: S, shutdown: F) -> Result<RunSummary, PipelineError>
    where
        S: OutputSink,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let containers = tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested during container discovery");
                let summary = RunSummary {
                    outcome: RunOutcome::ShutdownRequested,
                    records_written: 0,
                    completed: 0,
                    failed: 0,
                };
                self.logger.log_shutdown(&summary);
                return Ok(summary);
            }
            listing = self.source.list_workloads() => listing.map_err(PipelineError::Discovery)?,
        };

        self.run_with(containers, sink, shutdown).await
    }

    /// Collect from an already discovered set of containers
    pub async fn run_with<S, F>(
        &self,
        containers: Vec<ContainerRef>,
        sink: S,
        shutdown: F,
    ) -> Result<RunSummary, PipelineError>
    where
        S: OutputSink,
        F: Future<Output = ()>,
    {
        let containers = dedupe(containers);
        self.logger
            .log_startup(VERSION, containers.len(), self.config.streaming);

        let (event_tx, event_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (cancel_tx, _) = broadcast::channel(1);

        let mut readers = JoinSet::new();
        for container in &containers {
            let reader = StreamReader::new(self.source.clone(), container.clone(), event_tx.clone())
                .streaming(self.config.streaming)
                .decode_policy(self.config.decode_policy);
            readers.spawn(reader.run(cancel_tx.subscribe()));
        }
        // Readers hold the only senders from here on
        drop(event_tx);

        let result = Aggregator::new(sink, event_rx, &containers)
            .human_readable(self.config.human_readable)
            .logger(self.logger.clone())
            .run(shutdown)
            .await;

        // Fails only when every reader has already exited
        let _ = cancel_tx.send(());
        self.drain(&mut readers).await;

        if let Ok(summary) = &result {
            self.logger.log_shutdown(summary);
        }
        result
    }

    /// Wait for cancelled readers, aborting any still running after the grace period
    async fn drain(&self, readers: &mut JoinSet<()>) {
        let grace = self.config.shutdown_grace;

        let joined = tokio::time::timeout(grace, async {
            while let Some(result) = readers.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        warn!(error = %e, "Stream reader panicked");
                    }
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                remaining = readers.len(),
                grace_ms = grace.as_millis() as u64,
                "Stream readers still running after grace period, aborting"
            );
            readers.shutdown().await;
        } else {
            debug!("All stream readers stopped");
        }
    }
}

/// Drop repeated container ids, keeping the first occurrence
fn dedupe(containers: Vec<ContainerRef>) -> Vec<Arc<ContainerRef>> {
    let mut seen = HashSet::new();
    containers
        .into_iter()
        .filter(|container| {
            let first = seen.insert(container.id.clone());
            if !first {
                warn!(container_id = %container.id, "Ignoring duplicate container in listing");
            }
            first
        })
        .map(Arc::new)
        .collect()
}

/// Builder for a [`Pipeline`]
pub struct PipelineBuilder {
    source: Arc<dyn TelemetrySource>,
    config: PipelineConfig,
    endpoint: String,
}

impl PipelineBuilder {
    /// Create a builder with default configuration
    pub fn new(source: Arc<dyn TelemetrySource>) -> Self {
        Self {
            source,
            config: PipelineConfig::default(),
            endpoint: "unknown".to_string(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.config.streaming = streaming;
        self
    }

    pub fn human_readable(mut self, human_readable: bool) -> Self {
        self.config.human_readable = human_readable;
        self
    }

    pub fn decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.config.decode_policy = policy;
        self
    }

    /// Set the event channel capacity
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set how long readers may take to stop before being aborted
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    /// Daemon endpoint label attached to lifecycle logs
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            source: self.source,
            config: self.config,
            logger: StructuredLogger::new(self.endpoint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let containers = vec![
            ContainerRef::new("a", "/first", "busybox"),
            ContainerRef::new("b", "/other", "busybox"),
            ContainerRef::new("a", "/second", "busybox"),
        ];

        let unique = dedupe(containers);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].display_name(), "first");
        assert_eq!(unique[1].id, "b");
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(config.streaming);
        assert!(!config.human_readable);
        assert_eq!(config.decode_policy, DecodePolicy::Skip);
        assert_eq!(config.channel_capacity, 1024);
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
    }
}
