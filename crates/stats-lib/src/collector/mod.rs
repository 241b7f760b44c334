//! Concurrent stats collection
//!
//! One [`StreamReader`] task per container reads its stats feed and sends
//! [`MonitorEvent`]s over a single channel. The [`Aggregator`] is the only
//! consumer: it derives metrics, writes them to the sink and counts finished
//! monitors. [`Pipeline`] wires the two together and owns the shutdown drain.

mod aggregator;
mod pipeline;
mod reader;


pub use aggregator::{Aggregator, RunOutcome, RunSummary};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineConfig};
pub use reader::{DecodePolicy, StreamReader};

use crate::models::{ContainerRef, MonitorState, PlatformTag, RawSnapshot};
use std::sync::Arc;

/// Messages from stream readers to the aggregator
#[derive(Debug)]
pub enum MonitorEvent {
    /// A decoded record from one container's feed
    SnapshotArrived {
        container: Arc<ContainerRef>,
        platform: PlatformTag,
        snapshot: Box<RawSnapshot>,
    },
    /// The reader for a container has stopped; sent exactly once per reader
    MonitorDone {
        container_id: String,
        outcome: MonitorOutcome,
    },
}

/// How a stream reader ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The feed ended normally (or the single-shot record was delivered)
    Completed,
    /// The feed could not be opened, broke mid-stream, or hit a fatal decode error
    Failed { reason: String },
}

impl MonitorOutcome {
    pub fn failed(reason: impl ToString) -> Self {
        Self::Failed {
            reason: reason.to_string(),
        }
    }

    /// Terminal monitor state this outcome leads to
    pub fn state(&self) -> MonitorState {
        match self {
            Self::Completed => MonitorState::Completed,
            Self::Failed { .. } => MonitorState::Failed,
        }
    }
}
