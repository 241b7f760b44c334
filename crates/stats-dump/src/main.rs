//! stats-dump - stream container resource usage
//!
//! Connects to a Docker-compatible daemon, follows the stats feed of every
//! running container and writes one row per sample to stdout as a table,
//! CSV or JSON lines. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use stats_lib::{
    create_sink, CollectorMetrics, DockerClient, PipelineBuilder, PipelineError, RunSummary,
};
use std::io::{self, BufWriter};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod cli;
mod config;

use cli::Cli;
use config::{DumpConfig, LogFormat};

const EXIT_FAILURE: u8 = 1;
const EXIT_DISCOVERY: u8 = 3;
const EXIT_SINK: u8 = 4;

#[tokio::main]
async fn main() -> ExitCode {
    // Usage errors exit with status 2 from here
    let cli = Cli::parse();

    let config = match DumpConfig::load() {
        Ok(mut config) => {
            config.apply_cli(&cli);
            config
        }
        Err(e) => {
            eprintln!("stats-dump: invalid configuration: {:#}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    init_tracing(config.log_format);

    match run(config).await {
        Ok(summary) => {
            info!(
                reason = %summary.outcome,
                records_written = summary.records_written,
                "Collection finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            let message = format!("{:#}", e);
            error!(error = %message, "Collection failed");
            ExitCode::from(exit_status(&e))
        }
    }
}

/// Install the tracing subscriber, writing to stderr so stdout carries only records
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (json, text) = match format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(io::stderr)), None),
        LogFormat::Text => (None, Some(fmt::layer().with_writer(io::stderr))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

async fn run(config: DumpConfig) -> Result<RunSummary> {
    // Register collector metrics before anything can scrape them
    CollectorMetrics::new();

    if let Some(port) = config.metrics_port {
        tokio::spawn(async move {
            if let Err(e) = api::serve(port).await {
                warn!(port = port, error = %e, "Metrics server stopped");
            }
        });
    }

    let mut client = DockerClient::from_host(&config.docker_host)
        .with_context(|| format!("invalid docker host '{}'", config.docker_host))?;
    if let Some(version) = &config.api_version {
        client = client.with_api_version(version.as_str());
    }
    let endpoint = client.endpoint().to_string();
    info!(endpoint = %endpoint, format = %config.format, "Starting stats-dump");

    let pipeline = PipelineBuilder::new(Arc::new(client))
        .config(config.pipeline_config())
        .endpoint(endpoint)
        .build();

    let shutdown = shutdown_signal()?;
    let sink = create_sink(config.format, BufWriter::new(io::stdout()));

    let summary = pipeline.run(sink, shutdown).await?;
    Ok(summary)
}

/// Resolves on the first SIGINT or SIGTERM
fn shutdown_signal() -> io::Result<impl std::future::Future<Output = ()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating shutdown");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating shutdown");
            }
        }
    })
}

/// Process exit status for a failed run
fn exit_status(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<PipelineError>() {
        Some(PipelineError::Discovery(_)) => EXIT_DISCOVERY,
        Some(PipelineError::Sink(_)) => EXIT_SINK,
        None => EXIT_FAILURE,
    }
}
