//! Command line arguments

use clap::{ArgAction, Parser};
use stats_lib::{DecodePolicy, OutputFormat};

/// Stream resource usage of running containers
#[derive(Debug, Parser)]
#[command(name = "stats-dump")]
#[command(version, about = "Stream CPU and memory usage of running containers", long_about = None)]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Print byte sizes and percentages for people (e.g. 512MiB, 12.50%)
    #[arg(short = 'h', long)]
    pub human_readable: bool,

    /// Output format: table, csv or json [default: table]
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Daemon endpoint, e.g. unix:///var/run/docker.sock or tcp://host:2375
    #[arg(long)]
    pub host: Option<String>,

    /// Take one sample per container, then exit
    #[arg(long)]
    pub no_stream: bool,

    /// What to do with stats records that cannot be decoded: skip or fail
    #[arg(long, value_name = "POLICY")]
    pub on_decode_error: Option<DecodePolicy>,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["stats-dump"]).unwrap();
        assert!(!cli.human_readable);
        assert!(cli.format.is_none());
        assert!(cli.host.is_none());
        assert!(!cli.no_stream);
        assert!(cli.on_decode_error.is_none());
        assert!(cli.metrics_port.is_none());
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from(["stats-dump", "-h", "-f", "csv"]).unwrap();
        assert!(cli.human_readable);
        assert_eq!(cli.format, Some(OutputFormat::Csv));
    }

    #[test]
    fn test_long_flags() {
        let cli = Cli::try_parse_from([
            "stats-dump",
            "--human-readable",
            "--format",
            "json",
            "--host",
            "tcp://10.0.0.5:2375",
            "--no-stream",
            "--on-decode-error",
            "fail",
            "--metrics-port",
            "9102",
        ])
        .unwrap();

        assert!(cli.human_readable);
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert_eq!(cli.host.as_deref(), Some("tcp://10.0.0.5:2375"));
        assert!(cli.no_stream);
        assert_eq!(cli.on_decode_error, Some(DecodePolicy::Fail));
        assert_eq!(cli.metrics_port, Some(9102));
    }

    #[test]
    fn test_invalid_format_is_usage_error() {
        let err = Cli::try_parse_from(["stats-dump", "--format", "yaml"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_long_help_only() {
        let err = Cli::try_parse_from(["stats-dump", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(err.to_string().contains("--human-readable"));
    }
}
