//! Per-container stats feed reader
//!
//! Opens one container's feed, decodes each record into a snapshot and
//! forwards it to the aggregator. Reports completion exactly once, and
//! never retries or reopens a feed.

use super::{MonitorEvent, MonitorOutcome};
use crate::daemon::TelemetrySource;
use crate::error::InvalidOption;
use crate::models::{ContainerRef, RawSnapshot};
use crate::observability::CollectorMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// What a reader does with a record it cannot decode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Count and log the record, then keep reading
    #[default]
    Skip,
    /// Stop the reader and report the monitor as failed
    Fail,
}

impl FromStr for DecodePolicy {
    type Err = InvalidOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "fail" => Ok(Self::Fail),
            _ => Err(InvalidOption {
                option: "decode error policy",
                value: s.to_string(),
                expected: "skip, fail",
            }),
        }
    }
}

impl fmt::Display for DecodePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("skip"),
            Self::Fail => f.write_str("fail"),
        }
    }
}

/// Reads one container's stats feed into the aggregator's channel
pub struct StreamReader {
    source: Arc<dyn TelemetrySource>,
    container: Arc<ContainerRef>,
    streaming: bool,
    decode_policy: DecodePolicy,
    events: mpsc::Sender<MonitorEvent>,
    metrics: CollectorMetrics,
}

impl StreamReader {
    /// Create a streaming reader that skips undecodable records
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        container: Arc<ContainerRef>,
        events: mpsc::Sender<MonitorEvent>,
    ) -> Self {
        Self {
            source,
            container,
            streaming: true,
            decode_policy: DecodePolicy::default(),
            events,
            metrics: CollectorMetrics::new(),
        }
    }

    /// Continuous feed, or a single record then stop
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    /// Run until the feed ends or `shutdown` fires.
    ///
    /// A cancelled reader exits without reporting completion; nobody is
    /// listening for it by then.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let outcome = tokio::select! {
            outcome = self.read_feed() => outcome,
            _ = shutdown.recv() => {
                debug!(container_id = %self.container.id, "Stream reader cancelled");
                return;
            }
        };

        let Some(outcome) = outcome else {
            debug!(container_id = %self.container.id, "Aggregator gone, stopping stream reader");
            return;
        };

        let done = MonitorEvent::MonitorDone {
            container_id: self.container.id.clone(),
            outcome,
        };
        if self.events.send(done).await.is_err() {
            debug!(container_id = %self.container.id, "Aggregator gone before completion was reported");
        }
    }

    /// Returns `None` when the aggregator stopped listening
    async fn read_feed(&self) -> Option<MonitorOutcome> {
        let container_id = &self.container.id;

        let mut feed = match self.source.open_feed(&self.container, self.streaming).await {
            Ok(feed) => feed,
            Err(e) => {
                self.metrics.inc_feed_errors();
                warn!(container_id = %container_id, error = %e, "Failed to open stats feed");
                return Some(MonitorOutcome::failed(e));
            }
        };

        loop {
            let record = match feed.records.next_record().await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(container_id = %container_id, "Stats feed ended");
                    return Some(MonitorOutcome::Completed);
                }
                Err(e) => {
                    self.metrics.inc_feed_errors();
                    warn!(container_id = %container_id, error = %e, "Stats feed broke");
                    return Some(MonitorOutcome::failed(e));
                }
            };

            let snapshot = match RawSnapshot::from_json(&record) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    self.metrics.inc_decode_errors();
                    match self.decode_policy {
                        DecodePolicy::Skip => {
                            warn!(
                                container_id = %container_id,
                                error = %e,
                                record_bytes = record.len(),
                                "Dropping undecodable stats record"
                            );
                            continue;
                        }
                        DecodePolicy::Fail => {
                            warn!(container_id = %container_id, error = %e, "Undecodable stats record, stopping");
                            return Some(MonitorOutcome::failed(e));
                        }
                    }
                }
            };

            let event = MonitorEvent::SnapshotArrived {
                container: self.container.clone(),
                platform: feed.platform,
                snapshot: Box::new(snapshot),
            };
            if self.events.send(event).await.is_err() {
                return None;
            }

            if !self.streaming {
                return Some(MonitorOutcome::Completed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlatformTag;
    use crate::testing::{linux_record, FakeSource, FeedScript};
    use bytes::Bytes;
    use std::time::Duration;

    fn container(id: &str) -> Arc<ContainerRef> {
        Arc::new(ContainerRef::new(id, format!("/{}", id), "busybox"))
    }

    /// Run a reader to completion and collect everything it sent
    async fn run_reader(
        source: FakeSource,
        container: Arc<ContainerRef>,
        streaming: bool,
        policy: DecodePolicy,
    ) -> Vec<MonitorEvent> {
        let (tx, mut rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = broadcast::channel(1);

        StreamReader::new(Arc::new(source), container, tx)
            .streaming(streaming)
            .decode_policy(policy)
            .run(cancel_rx)
            .await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn snapshot_count(events: &[MonitorEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, MonitorEvent::SnapshotArrived { .. }))
            .count()
    }

    fn last_outcome(events: &[MonitorEvent]) -> &MonitorOutcome {
        match events.last() {
            Some(MonitorEvent::MonitorDone { outcome, .. }) => outcome,
            other => panic!("expected MonitorDone last, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_policy_parse() {
        assert_eq!("skip".parse::<DecodePolicy>().unwrap(), DecodePolicy::Skip);
        assert_eq!("FAIL".parse::<DecodePolicy>().unwrap(), DecodePolicy::Fail);
        assert!("ignore".parse::<DecodePolicy>().is_err());
        assert_eq!(DecodePolicy::default(), DecodePolicy::Skip);
    }

    #[tokio::test]
    async fn test_streams_records_then_completes() {
        let web = container("web");
        let source = FakeSource::new().container(
            (*web).clone(),
            FeedScript::linux(vec![
                linux_record(200, 100, 1200, 1000, 4),
                linux_record(300, 200, 1400, 1200, 4),
            ]),
        );

        let events = run_reader(source, web, true, DecodePolicy::Skip).await;

        assert_eq!(events.len(), 3);
        assert_eq!(snapshot_count(&events), 2);
        assert_eq!(last_outcome(&events), &MonitorOutcome::Completed);

        match &events[0] {
            MonitorEvent::SnapshotArrived {
                container,
                platform,
                snapshot,
            } => {
                assert_eq!(container.id, "web");
                assert_eq!(*platform, PlatformTag::Linux);
                assert_eq!(snapshot.cpu_stats.cpu_usage.total_usage, 200);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_preserves_feed_order() {
        let web = container("web");
        let records = (1..=5)
            .map(|i| linux_record(i * 100, 0, 1000, 0, 1))
            .collect();
        let source = FakeSource::new().container((*web).clone(), FeedScript::linux(records));

        let events = run_reader(source, web, true, DecodePolicy::Skip).await;

        let totals: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::SnapshotArrived { snapshot, .. } => {
                    Some(snapshot.cpu_stats.cpu_usage.total_usage)
                }
                _ => None,
            })
            .collect();
        assert_eq!(totals, vec![100, 200, 300, 400, 500]);
    }

    #[tokio::test]
    async fn test_single_shot_reads_one_record() {
        let web = container("web");
        let source = FakeSource::new().container(
            (*web).clone(),
            FeedScript::linux(vec![
                linux_record(200, 100, 1200, 1000, 4),
                linux_record(300, 200, 1400, 1200, 4),
            ]),
        );

        let events = run_reader(source, web, false, DecodePolicy::Skip).await;

        assert_eq!(snapshot_count(&events), 1);
        assert_eq!(last_outcome(&events), &MonitorOutcome::Completed);
    }

    #[tokio::test]
    async fn test_skip_policy_drops_bad_records() {
        let web = container("web");
        let metrics = CollectorMetrics::new();
        let before = metrics.decode_errors();
        let source = FakeSource::new().container(
            (*web).clone(),
            FeedScript::linux(vec![
                Bytes::from_static(b"{\"cpu_stats\": "),
                linux_record(200, 100, 1200, 1000, 4),
                Bytes::from_static(b"garbage"),
            ]),
        );

        let events = run_reader(source, web, true, DecodePolicy::Skip).await;

        assert_eq!(snapshot_count(&events), 1);
        assert_eq!(last_outcome(&events), &MonitorOutcome::Completed);
        assert!(metrics.decode_errors() >= before + 2);
    }

    #[tokio::test]
    async fn test_fail_policy_stops_on_bad_record() {
        let web = container("web");
        let source = FakeSource::new().container(
            (*web).clone(),
            FeedScript::linux(vec![
                linux_record(200, 100, 1200, 1000, 4),
                Bytes::from_static(b"garbage"),
                linux_record(300, 200, 1400, 1200, 4),
            ]),
        );

        let events = run_reader(source, web, true, DecodePolicy::Fail).await;

        assert_eq!(snapshot_count(&events), 1);
        assert!(matches!(last_outcome(&events), MonitorOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_open_error_reports_failure() {
        let web = container("web");
        let source = FakeSource::new().container(
            (*web).clone(),
            FeedScript::OpenError("container is restarting".to_string()),
        );

        let events = run_reader(source, web, true, DecodePolicy::Skip).await;

        assert_eq!(events.len(), 1);
        match last_outcome(&events) {
            MonitorOutcome::Failed { reason } => assert!(reason.contains("container is restarting")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_error_reports_failure_after_snapshots() {
        let web = container("web");
        let source = FakeSource::new().container(
            (*web).clone(),
            FeedScript::Records {
                platform: PlatformTag::Linux,
                records: vec![
                    Ok(linux_record(200, 100, 1200, 1000, 4)),
                    Err("connection reset".to_string()),
                    Ok(linux_record(300, 200, 1400, 1200, 4)),
                ],
            },
        );

        let events = run_reader(source, web, true, DecodePolicy::Skip).await;

        assert_eq!(snapshot_count(&events), 1);
        assert!(matches!(last_outcome(&events), MonitorOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_cancel_stalled_feed() {
        let web = container("web");
        let source = FakeSource::new().container((*web).clone(), FeedScript::Stall);
        let (tx, mut rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = broadcast::channel(1);

        let handle = tokio::spawn(StreamReader::new(Arc::new(source), web, tx).run(cancel_rx));
        tokio::task::yield_now().await;
        cancel_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reader should stop after cancellation")
            .unwrap();

        // Cancelled readers do not report completion
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stops_when_aggregator_is_gone() {
        let web = container("web");
        let source = FakeSource::new().container(
            (*web).clone(),
            FeedScript::linux(vec![linux_record(200, 100, 1200, 1000, 4)]),
        );
        let (tx, rx) = mpsc::channel(1);
        let (_cancel_tx, cancel_rx) = broadcast::channel(1);
        drop(rx);

        tokio::time::timeout(
            Duration::from_secs(5),
            StreamReader::new(Arc::new(source), web, tx).run(cancel_rx),
        )
        .await
        .expect("reader should stop once the channel is closed");
    }
}
