//! In-memory daemon and writers for exercising the collector without Docker

use crate::daemon::{async_trait, RecordFeed, TelemetryFeed, TelemetrySource};
use crate::error::DaemonError;
use crate::models::{ContainerRef, PlatformTag};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// What opening a container's feed does
pub(crate) enum FeedScript {
    /// Yield these records in order, then end. `Err` entries fail the read.
    Records {
        platform: PlatformTag,
        records: Vec<Result<Bytes, String>>,
    },
    /// Opening the feed fails
    OpenError(String),
    /// Opening succeeds but no record ever arrives
    Stall,
    /// Opening never completes
    StallOnOpen,
}

impl FeedScript {
    pub(crate) fn linux(records: Vec<Bytes>) -> Self {
        Self::Records {
            platform: PlatformTag::Linux,
            records: records.into_iter().map(Ok).collect(),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeSource {
    containers: Vec<ContainerRef>,
    feeds: Mutex<HashMap<String, FeedScript>>,
    list_error: Option<String>,
    list_stalls: bool,
}

impl FakeSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn container(mut self, container: ContainerRef, script: FeedScript) -> Self {
        self.feeds
            .get_mut()
            .unwrap()
            .insert(container.id.clone(), script);
        self.containers.push(container);
        self
    }

    /// Listing never completes
    pub(crate) fn stall_listing(mut self) -> Self {
        self.list_stalls = true;
        self
    }

    pub(crate) fn fail_listing(mut self, message: &str) -> Self {
        self.list_error = Some(message.to_string());
        self
    }
}

fn daemon_error(message: &str) -> DaemonError {
    DaemonError::Status {
        status: 500,
        message: message.to_string(),
    }
}

#[async_trait]
impl TelemetrySource for FakeSource {
    async fn list_workloads(&self) -> Result<Vec<ContainerRef>, DaemonError> {
        if self.list_stalls {
            return std::future::pending().await;
        }
        match &self.list_error {
            Some(message) => Err(daemon_error(message)),
            None => Ok(self.containers.clone()),
        }
    }

    async fn open_feed(
        &self,
        container: &ContainerRef,
        _streaming: bool,
    ) -> Result<TelemetryFeed, DaemonError> {
        let script = self.feeds.lock().unwrap().remove(&container.id);
        match script {
            Some(FeedScript::Records { platform, records }) => Ok(TelemetryFeed::new(
                platform,
                ScriptedFeed {
                    records: records.into(),
                },
            )),
            Some(FeedScript::OpenError(message)) => Err(daemon_error(&message)),
            Some(FeedScript::Stall) => Ok(TelemetryFeed::new(PlatformTag::Linux, StalledFeed)),
            Some(FeedScript::StallOnOpen) => std::future::pending().await,
            None => Err(daemon_error("no such container")),
        }
    }
}

struct ScriptedFeed {
    records: VecDeque<Result<Bytes, String>>,
}

#[async_trait]
impl RecordFeed for ScriptedFeed {
    async fn next_record(&mut self) -> Result<Option<Bytes>, DaemonError> {
        match self.records.pop_front() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(message)) => Err(daemon_error(&message)),
            None => Ok(None),
        }
    }
}

struct StalledFeed;

#[async_trait]
impl RecordFeed for StalledFeed {
    async fn next_record(&mut self) -> Result<Option<Bytes>, DaemonError> {
        std::future::pending().await
    }
}

/// A linux stats record with the given current/previous counters
pub(crate) fn linux_record(
    total: u64,
    prev_total: u64,
    system: u64,
    prev_system: u64,
    online_cpus: u32,
) -> Bytes {
    let record = serde_json::json!({
        "read": "2024-03-01T10:00:01Z",
        "preread": "2024-03-01T10:00:00Z",
        "pids_stats": {"current": 3},
        "cpu_stats": {
            "cpu_usage": {"total_usage": total},
            "system_cpu_usage": system,
            "online_cpus": online_cpus
        },
        "precpu_stats": {
            "cpu_usage": {"total_usage": prev_total},
            "system_cpu_usage": prev_system
        },
        "memory_stats": {"usage": 3_000_000, "limit": 10_000_000, "stats": {"cache": 1_000_000}}
    });
    Bytes::from(record.to_string())
}

/// Writer whose contents can be inspected after it has been moved into a sink
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that accepts a number of complete lines, then fails every write
pub(crate) struct FailingWriter {
    allowed_lines: usize,
    lines_written: usize,
}

impl FailingWriter {
    pub(crate) fn after_lines(allowed_lines: usize) -> Self {
        Self {
            allowed_lines,
            lines_written: 0,
        }
    }
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.lines_written >= self.allowed_lines {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "output closed"));
        }
        self.lines_written += buf.iter().filter(|&&b| b == b'\n').count();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
