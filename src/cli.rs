//! CLI argument parsing for fdtrail

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "fdtrail")]
#[command(version)]
#[command(
    about = "Rebuild per-thread file descriptor and I/O history from a kernel trace",
    long_about = None
)]
pub struct Cli {
    /// Trace to replay (JSON lines, one event per line)
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Event layout of the tracer that produced the trace (TOML)
    #[arg(long = "layout", value_name = "FILE")]
    pub layout: Option<PathBuf>,

    /// Syscalls to handle (e.g., -e trace=read,write or -e trace=io,fd)
    #[arg(short = 'e', long = "expr", value_name = "EXPR")]
    pub filter: Option<String>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Time of the report in nanoseconds (default: last event)
    #[arg(long = "at", value_name = "NS", allow_negative_numbers = true)]
    pub at: Option<i64>,

    /// Print every attribute holding a value at report time
    #[arg(long = "dump")]
    pub dump: bool,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_trace() {
        let cli = Cli::parse_from(["fdtrail", "trace.jsonl"]);
        assert_eq!(cli.trace, PathBuf::from("trace.jsonl"));
        assert!(cli.layout.is_none());
        assert!(cli.filter.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(cli.at.is_none());
        assert!(!cli.dump);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_requires_trace() {
        assert!(Cli::try_parse_from(["fdtrail"]).is_err());
    }

    #[test]
    fn test_cli_all_options() {
        let cli = Cli::parse_from([
            "fdtrail",
            "--layout",
            "perf.toml",
            "-e",
            "trace=io",
            "--format",
            "json",
            "--at",
            "1500",
            "--dump",
            "--debug",
            "trace.jsonl",
        ]);
        assert_eq!(cli.layout, Some(PathBuf::from("perf.toml")));
        assert_eq!(cli.filter.as_deref(), Some("trace=io"));
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.at, Some(1500));
        assert!(cli.dump);
        assert!(cli.debug);
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["fdtrail", "--format", "csv", "t.jsonl"]).is_err());
    }
}
