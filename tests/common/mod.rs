#![allow(dead_code)]

pub use procdag_test_utils::{
    init_tracing, ConfigFileBuilder, NodeConfigBuilder, ScriptedMetrics, ScriptedSupervisor,
    SupervisorEvent,
};

use procdag::config::ConfigFile;
use procdag::dag::GraphModel;
use procdag::engine::{RunReport, Scheduler, SchedulerOptions};
use procdag::resources::ResourceGate;

/// Run `cfg` against scripted processes and metrics.
pub async fn run_scripted(
    cfg: &ConfigFile,
    supervisor: ScriptedSupervisor,
    metrics: ScriptedMetrics,
) -> RunReport {
    run_with_options(cfg, supervisor, metrics, SchedulerOptions::from_config(cfg)).await
}

pub async fn run_with_options(
    cfg: &ConfigFile,
    supervisor: ScriptedSupervisor,
    metrics: ScriptedMetrics,
    options: SchedulerOptions,
) -> RunReport {
    let gate = ResourceGate::new(metrics, cfg.runner.resource_poll_interval());
    Scheduler::new(GraphModel::from_config(cfg), supervisor, gate, options)
        .run()
        .await
}

/// A -> {B, C} -> D
pub fn diamond() -> ConfigFileBuilder {
    ConfigFileBuilder::new()
        .node("A", &[])
        .node("B", &["A"])
        .node("C", &["A"])
        .node("D", &["B", "C"])
}
