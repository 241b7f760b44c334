//! Container daemon access
//!
//! The collector only needs two capabilities from the daemon: list the
//! running containers once at startup, and open a stats feed per container.
//! [`TelemetrySource`] abstracts both so the pipeline can run against the
//! Docker Engine API or an in-memory fake.

mod docker;

pub use docker::{DockerClient, DockerEndpoint, DEFAULT_DOCKER_HOST, MAX_RECORD_BYTES};

use crate::error::DaemonError;
use crate::models::{ContainerRef, PlatformTag};
use bytes::Bytes;

pub use async_trait::async_trait;

/// Sequence of raw stats records for one container
#[async_trait]
pub trait RecordFeed: Send {
    /// Wait for the next record. `Ok(None)` means the feed has ended.
    async fn next_record(&mut self) -> Result<Option<Bytes>, DaemonError>;
}

/// An opened stats feed and the platform its records describe
pub struct TelemetryFeed {
    pub platform: PlatformTag,
    pub records: Box<dyn RecordFeed>,
}

impl TelemetryFeed {
    pub fn new(platform: PlatformTag, records: impl RecordFeed + 'static) -> Self {
        Self {
            platform,
            records: Box::new(records),
        }
    }
}

/// Daemon capabilities consumed by the collector
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// List the containers to monitor
    async fn list_workloads(&self) -> Result<Vec<ContainerRef>, DaemonError>;

    /// Open a stats feed; with `streaming` false the daemon sends one record
    async fn open_feed(
        &self,
        container: &ContainerRef,
        streaming: bool,
    ) -> Result<TelemetryFeed, DaemonError>;
}
