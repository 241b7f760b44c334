//! Container stats collection library
//!
//! This crate provides the core functionality for:
//! - Reading per-container stats feeds from a Docker-compatible daemon
//! - Deriving CPU and memory metrics from cumulative counters
//! - Fanning all feeds into a single output sink (table, CSV, JSON lines)
//! - Lifecycle control, shutdown drain and observability

pub mod calculator;
pub mod collector;
pub mod daemon;
pub mod error;
pub mod models;
pub mod observability;
pub mod sink;

#[cfg(test)]
mod testing;

pub use collector::{
    DecodePolicy, Pipeline, PipelineBuilder, PipelineConfig, RunOutcome, RunSummary,
};
pub use daemon::{DockerClient, TelemetrySource, DEFAULT_DOCKER_HOST};
pub use error::{DaemonError, InvalidOption, PipelineError, SinkError};
pub use models::*;
pub use observability::{CollectorMetrics, StructuredLogger};
pub use sink::{create_sink, OutputFormat, OutputSink};
