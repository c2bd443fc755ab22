// src/cli.rs

//! CLI argument parsing using `clap`.

use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};

use crate::context::RawContext;
use crate::types::UNMAPPED;

/// Command-line arguments for `subdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "subdag",
    version,
    about = "Run a nested DAG as a single task of its parent and propagate the outcome.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Subdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Subdag.toml")]
    pub config: String,

    /// Logical date of the parent run, RFC 3339 (e.g. 2016-01-01T00:00:00Z).
    #[arg(long, value_name = "DATE")]
    pub logical_date: DateTime<Utc>,

    /// Start of the run's data interval (needs `--data-interval-end`).
    #[arg(long, value_name = "DATE", requires = "data_interval_end")]
    pub data_interval_start: Option<DateTime<Utc>>,

    /// End of the run's data interval.
    #[arg(long, value_name = "DATE", requires = "data_interval_start")]
    pub data_interval_end: Option<DateTime<Utc>>,

    /// Map index of the operator task instance; -1 when not mapped.
    #[arg(long, value_name = "N", default_value_t = UNMAPPED, allow_negative_numbers = true)]
    pub map_index: i64,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SUBDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print both DAGs, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Reset a failed nested run and its task instances before waiting on it.
    #[arg(long)]
    pub reset_failed: bool,
}

impl CliArgs {
    /// The execution context described by the flags, before normalisation.
    pub fn raw_context(&self) -> RawContext {
        RawContext {
            logical_date: Some(self.logical_date),
            data_interval_start: self.data_interval_start,
            data_interval_end: self.data_interval_end,
            map_index: Some(self.map_index),
            ..RawContext::default()
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_and_default_flags() {
        let args = CliArgs::try_parse_from([
            "subdag",
            "--logical-date",
            "2016-01-01T00:00:00Z",
        ])
        .unwrap();
        assert_eq!(args.config, "Subdag.toml");
        assert_eq!(args.map_index, -1);
        assert!(!args.dry_run);
        assert!(!args.reset_failed);
    }

    #[test]
    fn flags_normalise_into_an_execution_context() {
        use crate::context::ExecutionContext;

        let args = CliArgs::try_parse_from([
            "subdag",
            "--logical-date",
            "2016-01-02T00:00:00Z",
            "--data-interval-start",
            "2016-01-01T00:00:00Z",
            "--data-interval-end",
            "2016-01-02T00:00:00Z",
            "--map-index",
            "4",
        ])
        .unwrap();

        let ctx = ExecutionContext::try_from(args.raw_context()).unwrap();
        assert_eq!(ctx.logical_date(), args.logical_date);
        assert_eq!(
            ctx.data_interval(),
            Some((args.data_interval_start.unwrap(), args.data_interval_end.unwrap()))
        );
        assert_eq!(ctx.map_index(), 4);
        assert_eq!(ctx.dag_run(), None);
    }

    #[test]
    fn reversed_data_interval_is_a_context_error() {
        use crate::context::ExecutionContext;
        use crate::errors::SubdagError;

        let args = CliArgs::try_parse_from([
            "subdag",
            "--logical-date",
            "2016-01-02T00:00:00Z",
            "--data-interval-start",
            "2016-01-03T00:00:00Z",
            "--data-interval-end",
            "2016-01-01T00:00:00Z",
        ])
        .unwrap();

        let err = ExecutionContext::try_from(args.raw_context()).unwrap_err();
        assert!(matches!(err, SubdagError::ContextError(_)));
    }

    #[test]
    fn half_data_interval_is_refused_by_the_parser() {
        assert!(CliArgs::try_parse_from([
            "subdag",
            "--logical-date",
            "2016-01-02T00:00:00Z",
            "--data-interval-start",
            "2016-01-01T00:00:00Z",
        ])
        .is_err());
    }

    #[test]
    fn logical_date_is_required() {
        assert!(CliArgs::try_parse_from(["subdag"]).is_err());
    }
}
