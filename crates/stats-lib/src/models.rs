//! Core data models for the stats collector

use crate::error::DecodeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A running container as reported by the daemon's container listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Names", default, deserialize_with = "null_as_default")]
    pub names: Vec<String>,
    #[serde(rename = "Image", default)]
    pub image: String,
}

impl ContainerRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            names: vec![name.into()],
            image: image.into(),
        }
    }

    /// First display name without the leading `/` the daemon prefixes
    pub fn display_name(&self) -> &str {
        self.names
            .first()
            .map(|name| name.trim_start_matches('/'))
            .unwrap_or_default()
    }
}

/// Platform the daemon runs containers on; selects the derivation formulas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformTag {
    Linux,
    Windows,
    #[default]
    Unknown,
}

impl PlatformTag {
    /// Parse the daemon's `OSType` value. Anything unrecognized is `Unknown`.
    pub fn from_os_type(os_type: &str) -> Self {
        match os_type.trim().to_ascii_lowercase().as_str() {
            "linux" => Self::Linux,
            "windows" => Self::Windows,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One telemetry record for a container.
///
/// Every record carries both the current and the previous cumulative
/// counters, so deltas can be derived without keeping state between records.
/// All fields default when the daemon omits them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub read: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preread: Option<DateTime<Utc>>,
    #[serde(default)]
    pub num_procs: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pids_stats: PidsStats,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cpu_stats: CpuStats,
    #[serde(default, deserialize_with = "null_as_default")]
    pub precpu_stats: CpuStats,
    #[serde(default, deserialize_with = "null_as_default")]
    pub memory_stats: MemoryStats,
}

impl RawSnapshot {
    /// Decode a single JSON record as delivered by the stats feed
    pub fn from_json(record: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(record).map_err(DecodeError::from)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PidsStats {
    #[serde(default)]
    pub current: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    #[serde(default, deserialize_with = "null_as_default")]
    pub cpu_usage: CpuUsage,
    #[serde(default)]
    pub system_cpu_usage: u64,
    #[serde(default)]
    pub online_cpus: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub percpu_usage: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub usage: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stats: HashMap<String, u64>,
    #[serde(default)]
    pub privateworkingset: u64,
}

impl MemoryStats {
    /// Reclaimable page cache included in `usage`
    pub fn cache(&self) -> u64 {
        self.stats.get("cache").copied().unwrap_or(0)
    }
}

/// Metrics derived from one snapshot, ready for output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculatedMetrics {
    pub os: PlatformTag,
    pub id: String,
    pub name: String,
    pub image: String,
    pub cpu_percentage: f64,
    pub memory_usage: f64,
    pub memory_limit: f64,
    pub memory_percentage: f64,
}

impl CalculatedMetrics {
    /// Abbreviated container id used by the table and CSV outputs
    pub fn short_id(&self) -> &str {
        self.id.get(..10).unwrap_or(&self.id)
    }
}

/// Lifecycle of a single container monitor, tracked by the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Active,
    Completed,
    Failed,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
