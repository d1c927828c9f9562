// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod lock;
pub mod logging;
pub mod resources;
pub mod types;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::model::ConfigFile;
use crate::dag::GraphModel;
use crate::engine::{RunReport, Scheduler, SchedulerOptions};
use crate::errors::Result;
use crate::exec::{OsSupervisor, UnitResolver};
use crate::lock::SingletonLock;
use crate::resources::{ResourceGate, SystemMetrics};

/// High-level entry point used by `main.rs`.
///
/// `cfg` must already be loaded; logging should already be initialised so
/// that config problems and the run itself end up in the same sinks.
/// `started` is when the process started; the global deadline counts from
/// there.
pub async fn run(args: &CliArgs, cfg: ConfigFile, started: Instant) -> Result<()> {
    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let report = execute_from(&cfg, started).await?;
    info!(
        completed = report.completion_order.len(),
        duration = ?report.duration,
        "all nodes completed"
    );
    Ok(())
}

/// Run the graph once with real processes and host metrics.
///
/// - Takes the singleton lock for the whole run (fails with
///   `LockContention` if another instance holds it).
/// - Returns the report on success and the error matching the failure class
///   otherwise.
pub async fn execute(cfg: &ConfigFile) -> Result<RunReport> {
    execute_from(cfg, Instant::now()).await
}

/// Like [`execute`], with the global deadline counted from `started`.
pub async fn execute_from(cfg: &ConfigFile, started: Instant) -> Result<RunReport> {
    let _guard = SingletonLock::new(&cfg.lock.path).acquire_guard()?;
    debug!(lock = %cfg.lock.path.display(), "singleton lock held");

    let graph = GraphModel::from_config(cfg);
    let supervisor = OsSupervisor::new(UnitResolver::from_config(cfg));
    let gate = ResourceGate::new(
        SystemMetrics::new(&cfg.runner.process_dir),
        cfg.runner.resource_poll_interval(),
    );

    let options = SchedulerOptions::from_config(cfg).with_deadline_origin(started);
    let scheduler = Scheduler::new(graph, supervisor, gate, options);
    scheduler.run().await.into_result()
}

/// Print nodes, prerequisites and the order they would launch in with
/// unlimited resources. Graph structure errors are reported as such.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    println!("procdag dry-run");
    println!("  process_dir = {}", cfg.runner.process_dir.display());
    if let Some(ref interpreter) = cfg.runner.interpreter {
        println!("  interpreter = {interpreter}");
    }
    match cfg.deadline() {
        Some(deadline) => println!("  deadline = {deadline:?}"),
        None => println!("  deadline = none"),
    }
    match cfg.effective_resources() {
        Some(limits) => println!("  resources = {limits:?}"),
        None => println!("  resources = unlimited"),
    }
    println!();

    println!("nodes ({}):", cfg.node.len());
    for (name, node) in cfg.node.iter() {
        println!("  - {name}");
        if !node.prereqs.is_empty() {
            println!("      in: {:?}", node.prereqs);
        }
        if let Some(ref cmd) = node.cmd {
            println!("      cmd: {cmd}");
        }
        if let Some(timeout) = node.timeout() {
            println!("      timeout: {timeout:?}");
        }
    }
    println!();

    let graph = GraphModel::from_config(cfg);
    graph.validate()?;
    println!("launch order:");
    for (i, name) in graph.launch_order()?.iter().enumerate() {
        println!("  {:>3}. {name}", i + 1);
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
