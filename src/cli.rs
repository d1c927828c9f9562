// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `procdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procdag",
    version,
    about = "Run a DAG of processes once, gated on host resources.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Procdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Procdag.toml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Directory for main.log, error.log and benchmarks.log. Overrides
    /// `[logging] dir` from the config file.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Parse + validate, print the graph and launch order, but don't start
    /// any process.
    #[arg(long)]
    pub dry_run: bool,
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
    fn defaults() {
        let args = CliArgs::try_parse_from(["procdag"]).unwrap();
        assert_eq!(args.config, crate::config::default_config_path());
        assert!(args.log_level.is_none());
        assert!(!args.dry_run);
    }

    #[test]
    fn all_flags() {
        let args = CliArgs::try_parse_from([
            "procdag",
            "--config",
            "etc/run.toml",
            "--log-level",
            "debug",
            "--log-dir",
            "logs",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("etc/run.toml"));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert_eq!(args.log_dir, Some(PathBuf::from("logs")));
        assert!(args.dry_run);
    }
}
