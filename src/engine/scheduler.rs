// src/engine/scheduler.rs

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::Local;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::model::ConfigFile;
use crate::dag::GraphModel;
use crate::engine::core::{Halt, RunCore};
use crate::engine::report::{NodeRecord, RunFailure, RunReport, RunStatus};
use crate::errors::{ProcdagError, Result};
use crate::exec::{PollStatus, ProcessExit, ProcessHandle, ProcessSupervisor};
use crate::logging::BENCHMARK_TARGET;
use crate::resources::{MetricsSource, ResourceGate, ResourceLimits};
use crate::types::NodeName;

/// Knobs for one run, normally taken from the config file.
#[derive(Debug, Clone, Default)]
pub struct SchedulerOptions {
    /// Sleep between polling sweeps while something is running.
    pub poll_interval: Duration,
    /// Measured from `deadline_origin`.
    pub deadline: Option<Duration>,
    /// Instant the deadline counts from. `None` means the start of
    /// [`Scheduler::run`]; the binary passes its own start time.
    pub deadline_origin: Option<Instant>,
    /// `None` disables the resource gate.
    pub resources: Option<ResourceLimits>,
    pub node_timeouts: HashMap<NodeName, Duration>,
}

impl SchedulerOptions {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            poll_interval: cfg.runner.poll_interval(),
            deadline: cfg.deadline(),
            deadline_origin: None,
            resources: cfg.effective_resources().copied(),
            node_timeouts: cfg
                .node
                .iter()
                .filter_map(|(name, node)| node.timeout().map(|t| (name.clone(), t)))
                .collect(),
        }
    }

    pub fn with_deadline_origin(mut self, origin: Instant) -> Self {
        self.deadline_origin = Some(origin);
        self
    }
}

/// Async control loop around [`RunCore`].
///
/// One task owns everything: it admits ready nodes through the resource
/// gate, launches them through the supervisor and polls the running set
/// every `poll_interval`. Nothing is shared, so no locking is needed.
pub struct Scheduler<S: ProcessSupervisor, M: MetricsSource> {
    core: RunCore,
    supervisor: S,
    gate: ResourceGate<M>,
    options: SchedulerOptions,
    handles: HashMap<NodeName, ProcessHandle>,
    records: HashMap<NodeName, NodeRecord>,
    deadline_at: Option<Instant>,
}

impl<S: ProcessSupervisor, M: MetricsSource> fmt::Debug for Scheduler<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("core", &self.core)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S: ProcessSupervisor, M: MetricsSource> Scheduler<S, M> {
    pub fn new(
        graph: GraphModel,
        supervisor: S,
        gate: ResourceGate<M>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            core: RunCore::new(graph),
            supervisor,
            gate,
            options,
            handles: HashMap::new(),
            records: HashMap::new(),
            deadline_at: None,
        }
    }

    /// Execute the whole graph and account for every node.
    ///
    /// Never returns an error: every failure class ends up in
    /// [`RunReport::status`]. Use [`RunReport::into_result`] to turn it into
    /// a `Result`.
    pub async fn run(mut self) -> RunReport {
        let started = Instant::now();
        let origin = self.options.deadline_origin.unwrap_or(started);
        self.deadline_at = self.options.deadline.and_then(|d| {
            let at = origin.checked_add(d);
            if at.is_none() {
                warn!(deadline = ?d, "deadline is beyond the clock's range; running without one");
            }
            at
        });

        info!(target: BENCHMARK_TARGET, "{}", separator());
        info!(
            target: BENCHMARK_TARGET,
            started_at = %Local::now().to_rfc3339(),
            nodes = self.core.graph().len(),
            "run started"
        );
        info!(
            nodes = self.core.graph().len(),
            deadline = ?self.options.deadline,
            resources = self.options.resources.is_some(),
            "scheduler started"
        );

        if let Err(e) = self.core.graph().validate() {
            error!(error = %e, "graph validation failed; nothing will be launched");
            let reason = match e {
                ProcdagError::GraphStructure(reason) => reason,
                other => other.to_string(),
            };
            self.core
                .halt(Halt::Failed(RunFailure::GraphStructure { reason }));
        }

        loop {
            if self.core.is_finished() {
                break;
            }

            self.check_deadline();
            self.admit_ready().await;

            if !self.core.running().is_empty() {
                tokio::time::sleep(self.options.poll_interval).await;
                self.check_deadline();
                self.poll_running().await;
            }
        }

        self.into_report(started.elapsed())
    }

    fn deadline_passed(&self) -> bool {
        self.deadline_at.is_some_and(|at| Instant::now() >= at)
    }

    fn check_deadline(&mut self) {
        if let Some(deadline) = self.options.deadline {
            if self.deadline_passed() && !self.core.is_halted() {
                warn!(?deadline, "global deadline reached; no new nodes will start");
                self.core.halt(Halt::TimedOut { deadline });
            }
        }
    }

    /// Launch every ready node, in queue order, as long as the run is not
    /// halted.
    async fn admit_ready(&mut self) {
        while let Some(node) = self.core.next_ready().map(str::to_string) {
            self.check_deadline();
            if self.core.is_halted() {
                break;
            }

            if let Some(limits) = self.options.resources {
                match self.gate.admit(&limits, self.deadline_at).await {
                    Ok(()) => {}
                    Err(ProcdagError::ResourceTimeout { waited }) => {
                        error!(node = %node, ?waited, "resources never became available");
                        self.core.halt(Halt::Failed(RunFailure::ResourceTimeout {
                            node: node.clone(),
                            waited,
                        }));
                        break;
                    }
                    Err(e) => {
                        error!(node = %node, error = %e, "resource sampling failed");
                        self.core.halt(Halt::Failed(RunFailure::Internal {
                            reason: format!("resource sampling failed: {e}"),
                        }));
                        break;
                    }
                }
            }

            match self.supervisor.launch(&node) {
                Ok(handle) => {
                    let record = self
                        .records
                        .entry(node.clone())
                        .or_insert_with(|| NodeRecord::new(node.clone()));
                    record.started_at = Some(handle.started_at());

                    info!(
                        target: BENCHMARK_TARGET,
                        node = %node,
                        pid = ?handle.pid(),
                        started_at = %handle.started_at().to_rfc3339(),
                        "node started"
                    );
                    info!(node = %node, pid = ?handle.pid(), "node launched");

                    self.handles.insert(node.clone(), handle);
                    self.transition(|core| core.on_launched(&node));
                }
                Err(e) => {
                    error!(node = %node, error = %e, "failed to launch node");
                    let reason = match e {
                        ProcdagError::LaunchFailed { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    self.transition(|core| core.on_launch_failed(&node, reason));
                }
            }
        }
    }

    /// One sweep over every running node, in launch order.
    async fn poll_running(&mut self) {
        let running: Vec<NodeName> = self.core.running().to_vec();

        for node in running {
            let Some(handle) = self.handles.get(&node).cloned() else {
                warn!(node = %node, "running node has no process handle");
                self.transition(|core| core.on_exited(&node, None).map(|_| ()));
                continue;
            };

            if let Some(limit) = self.options.node_timeouts.get(&node).copied() {
                if handle.elapsed() >= limit {
                    self.kill_timed_out(&handle, limit).await;
                    continue;
                }
            }

            match self.supervisor.poll(&handle).await {
                Ok(PollStatus::StillRunning) => {}
                Ok(PollStatus::Exited(exit)) => self.on_exit(&handle, exit),
                Err(e) => {
                    error!(node = %node, error = %e, "failed to poll node; treating as failed");
                    self.on_exit(&handle, ProcessExit::default());
                }
            }
        }
    }

    fn on_exit(&mut self, handle: &ProcessHandle, exit: ProcessExit) {
        let node = handle.node().to_string();
        self.finish_record(handle, exit.code);

        if exit.success() {
            let out = exit.stdout.trim_end();
            if !out.is_empty() {
                info!(node = %node, stdout = %out, "node output");
            }
            info!(node = %node, elapsed = ?handle.elapsed(), "node completed");
        } else {
            let err = exit.stderr.trim_end();
            error!(
                node = %node,
                exit_code = ?exit.code,
                stderr = %err,
                "node failed"
            );
        }

        self.handles.remove(&node);
        self.transition(|core| {
            let released = core.on_exited(&node, exit.code)?;
            if !released.is_empty() {
                debug!(node = %node, ?released, "dependents became ready");
            }
            Ok(())
        });
    }

    async fn kill_timed_out(&mut self, handle: &ProcessHandle, limit: Duration) {
        let node = handle.node().to_string();
        error!(node = %node, ?limit, "node exceeded its timeout; killing it");

        let code = match self.supervisor.kill(handle).await {
            Ok(exit) => exit.code,
            Err(e) => {
                warn!(node = %node, error = %e, "failed to kill timed-out node");
                None
            }
        };

        self.finish_record(handle, code);
        self.handles.remove(&node);
        self.transition(|core| core.on_node_timeout(&node, limit));
    }

    fn finish_record(&mut self, handle: &ProcessHandle, exit_code: Option<i32>) {
        let ended_at = Local::now();
        let duration = handle.elapsed();
        let record = self
            .records
            .entry(handle.node().to_string())
            .or_insert_with(|| NodeRecord::new(handle.node()));
        record.ended_at = Some(ended_at);
        record.duration = Some(duration);
        record.exit_code = exit_code;

        info!(
            target: BENCHMARK_TARGET,
            node = %handle.node(),
            exit_code = ?exit_code,
            ended_at = %ended_at.to_rfc3339(),
            duration_ms = duration.as_millis() as u64,
            "node finished"
        );
    }

    /// Apply a state transition; a bookkeeping error halts the run instead
    /// of unwinding the loop with processes still alive.
    fn transition<F>(&mut self, apply: F)
    where
        F: FnOnce(&mut RunCore) -> Result<()>,
    {
        if let Err(e) = apply(&mut self.core) {
            error!(error = %e, "scheduler bookkeeping error");
            self.core.halt(Halt::Failed(RunFailure::Internal {
                reason: e.to_string(),
            }));
        }
    }

    fn into_report(mut self, duration: Duration) -> RunReport {
        let outcome = self.core.finish();

        let records = outcome
            .states
            .iter()
            .map(|(name, state)| {
                let mut record = self
                    .records
                    .remove(name)
                    .unwrap_or_else(|| NodeRecord::new(name.clone()));
                record.state = *state;
                record
            })
            .collect();

        match &outcome.status {
            RunStatus::Succeeded => info!(
                completed = outcome.completion_order.len(),
                ?duration,
                "run succeeded"
            ),
            RunStatus::Failed(failure) => error!(
                ?failure,
                completed = ?outcome.completion_order,
                failed = ?outcome.failed,
                never_launched = ?outcome.never_launched,
                "run failed"
            ),
            RunStatus::TimedOut { deadline } => error!(
                ?deadline,
                completed = ?outcome.completion_order,
                never_launched = ?outcome.never_launched,
                "run timed out"
            ),
        }

        info!(
            target: BENCHMARK_TARGET,
            ended_at = %Local::now().to_rfc3339(),
            duration_ms = duration.as_millis() as u64,
            status = ?outcome.status,
            "run finished"
        );
        info!(target: BENCHMARK_TARGET, "{}", separator());

        RunReport {
            status: outcome.status,
            launch_order: outcome.launch_order,
            completion_order: outcome.completion_order,
            failed: outcome.failed,
            never_launched: outcome.never_launched,
            records,
            duration,
        }
    }
}

fn separator() -> String {
    "=".repeat(60)
}
