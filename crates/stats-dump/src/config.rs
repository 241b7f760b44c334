//! Collector configuration

use crate::cli::Cli;
use anyhow::Result;
use serde::Deserialize;
use stats_lib::{DecodePolicy, OutputFormat, PipelineConfig, DEFAULT_DOCKER_HOST};
use std::time::Duration;

/// Log output encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Collector configuration, read from `STATS_DUMP_*` variables
#[derive(Debug, Clone, Deserialize)]
pub struct DumpConfig {
    /// Daemon endpoint (falls back to DOCKER_HOST, then the local socket)
    #[serde(default = "default_docker_host")]
    pub docker_host: String,

    /// Pin the daemon API version, e.g. 1.41
    #[serde(default)]
    pub api_version: Option<String>,

    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default)]
    pub human_readable: bool,

    /// Follow stats feeds instead of sampling once
    #[serde(default = "default_stream")]
    pub stream: bool,

    #[serde(default)]
    pub decode_errors: DecodePolicy,

    /// Reader to aggregator channel capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Seconds readers get to stop on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// Port for the Prometheus listener; disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_docker_host() -> String {
    std::env::var("DOCKER_HOST").unwrap_or_else(|_| DEFAULT_DOCKER_HOST.to_string())
}

fn default_stream() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_shutdown_grace() -> u64 {
    5
}

impl DumpConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_env(config::Environment::with_prefix("STATS_DUMP"))
    }

    fn from_env(source: config::Environment) -> Result<Self> {
        let config = config::Config::builder().add_source(source).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Command line flags take precedence over the environment
    pub fn apply_cli(&mut self, cli: &Cli) {
        if cli.human_readable {
            self.human_readable = true;
        }
        if let Some(format) = cli.format {
            self.format = format;
        }
        if let Some(host) = &cli.host {
            self.docker_host = host.clone();
        }
        if cli.no_stream {
            self.stream = false;
        }
        if let Some(policy) = cli.on_decode_error {
            self.decode_errors = policy;
        }
        if let Some(port) = cli.metrics_port {
            self.metrics_port = Some(port);
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            streaming: self.stream,
            human_readable: self.human_readable,
            decode_policy: self.decode_errors,
            channel_capacity: self.channel_capacity,
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }
}
