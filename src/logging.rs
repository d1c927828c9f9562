// src/logging.rs

//! Logging setup for `procdag` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `PROCDAG_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Console logs go to STDERR. With a log directory configured, three files
//! are appended to as well:
//! - `main.log`: everything the console shows
//! - `error.log`: ERROR events only
//! - `benchmarks.log`: run and node timings (target [`BENCHMARK_TARGET`]),
//!   recorded regardless of the log level

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::anyhow;
use tracing::{Level, Metadata};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer, Registry};

use crate::cli::LogLevel;
use crate::errors::Result;

/// Target of timing events written to `benchmarks.log`.
pub const BENCHMARK_TARGET: &str = "procdag::benchmark";

pub const MAIN_LOG: &str = "main.log";
pub const ERROR_LOG: &str = "error.log";
pub const BENCHMARK_LOG: &str = "benchmarks.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, log_dir: Option<&Path>) -> Result<()> {
    let level = resolve_level(cli_level, std::env::var("PROCDAG_LOG").ok().as_deref());

    let mut layers: Vec<BoxedLayer> = vec![
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .with_filter(filter_fn(move |meta| {
                meta.level() <= &level && !is_benchmark(meta)
            }))
            .boxed(),
    ];

    if let Some(dir) = log_dir {
        fs::create_dir_all(dir)?;
        layers.push(file_layer(&dir.join(MAIN_LOG), move |meta| {
            meta.level() <= &level && !is_benchmark(meta)
        })?);
        layers.push(file_layer(&dir.join(ERROR_LOG), |meta| {
            *meta.level() == Level::ERROR
        })?);
        layers.push(file_layer(&dir.join(BENCHMARK_LOG), is_benchmark)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("failed to install logging subscriber: {e}"))?;

    Ok(())
}

fn file_layer<F>(path: &Path, keep: F) -> Result<BoxedLayer>
where
    F: Fn(&Metadata<'_>) -> bool + Send + Sync + 'static,
{
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file))
        .with_filter(filter_fn(keep))
        .boxed())
}

fn is_benchmark(meta: &Metadata<'_>) -> bool {
    meta.target() == BENCHMARK_TARGET
}

fn resolve_level(cli_level: Option<LogLevel>, env: Option<&str>) -> Level {
    match cli_level {
        Some(lvl) => level_from_log_level(lvl),
        None => env.and_then(parse_level_str).unwrap_or(Level::INFO),
    }
}

fn level_from_log_level(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
