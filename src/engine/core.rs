// src/engine/core.rs

//! Pure run state machine.
//!
//! `RunCore` owns all mutable scheduling state of a single run: node states,
//! the ready queue, the running set, completion bookkeeping and the halt
//! reason. It performs no IO and has no Tokio types, so the async
//! [`Scheduler`](crate::engine::Scheduler) is its only writer and tests can
//! drive it directly.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, warn};

use crate::dag::GraphModel;
use crate::engine::report::{RunFailure, RunStatus};
use crate::errors::{ProcdagError, Result};
use crate::types::{NodeName, NodeState};

/// Why the run stopped admitting new nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    Failed(RunFailure),
    TimedOut { deadline: Duration },
}

/// Everything `RunCore` knows once the run is over.
#[derive(Debug, Clone)]
pub struct CoreOutcome {
    pub status: RunStatus,
    pub launch_order: Vec<NodeName>,
    pub completion_order: Vec<NodeName>,
    pub failed: Vec<NodeName>,
    pub never_launched: Vec<NodeName>,
    /// Final state of every node, in declaration order.
    pub states: Vec<(NodeName, NodeState)>,
}

#[derive(Debug)]
pub struct RunCore {
    graph: GraphModel,
    states: HashMap<NodeName, NodeState>,
    ready: VecDeque<NodeName>,
    /// Launch order of nodes currently `Running`.
    running: Vec<NodeName>,
    launch_order: Vec<NodeName>,
    completion_order: Vec<NodeName>,
    completed: HashSet<NodeName>,
    failed: Vec<NodeName>,
    halt: Option<Halt>,
}

impl RunCore {
    /// Start a run: every node `Pending`, the initial ready set queued in
    /// declaration order.
    pub fn new(graph: GraphModel) -> Self {
        let mut states: HashMap<NodeName, NodeState> = graph
            .nodes()
            .map(|name| (name.to_string(), NodeState::Pending))
            .collect();

        let ready: VecDeque<NodeName> = graph.initial_ready_set().into();
        for name in &ready {
            states.insert(name.clone(), NodeState::Ready);
        }

        debug!(initial_ready = ?ready, "run core initialised");

        Self {
            graph,
            states,
            ready,
            running: Vec::new(),
            launch_order: Vec::new(),
            completion_order: Vec::new(),
            completed: HashSet::new(),
            failed: Vec::new(),
            halt: None,
        }
    }

    pub fn graph(&self) -> &GraphModel {
        &self.graph
    }

    pub fn state_of(&self, node: &str) -> Option<NodeState> {
        self.states.get(node).copied()
    }

    /// Nodes currently `Running`, in launch order.
    pub fn running(&self) -> &[NodeName] {
        &self.running
    }

    pub fn completion_order(&self) -> &[NodeName] {
        &self.completion_order
    }

    pub fn is_halted(&self) -> bool {
        self.halt.is_some()
    }

    pub fn halt_reason(&self) -> Option<&Halt> {
        self.halt.as_ref()
    }

    /// Stop admitting new nodes. The first fatal condition wins; later ones
    /// are logged and dropped. Returns `true` if this call set the reason.
    pub fn halt(&mut self, reason: Halt) -> bool {
        match self.halt {
            Some(ref existing) => {
                debug!(?existing, ignored = ?reason, "run already halted");
                false
            }
            None => {
                warn!(?reason, running = self.running.len(), "halting new admissions");
                self.halt = Some(reason);
                true
            }
        }
    }

    /// Next node to admit, or `None` when the queue is empty or the run is
    /// halted.
    pub fn next_ready(&self) -> Option<&str> {
        if self.halt.is_some() {
            return None;
        }
        self.ready.front().map(|s| s.as_str())
    }

    /// `Ready -> Running`.
    pub fn on_launched(&mut self, node: &str) -> Result<()> {
        self.expect_state(node, NodeState::Ready)?;
        self.take_ready(node);
        self.states.insert(node.to_string(), NodeState::Running);
        self.running.push(node.to_string());
        self.launch_order.push(node.to_string());
        Ok(())
    }

    /// `Ready -> Failed` for a node whose process could not be started.
    /// Halts the run.
    pub fn on_launch_failed(&mut self, node: &str, reason: impl Into<String>) -> Result<()> {
        self.expect_state(node, NodeState::Ready)?;
        self.take_ready(node);
        self.states.insert(node.to_string(), NodeState::Failed);
        self.failed.push(node.to_string());
        self.halt(Halt::Failed(RunFailure::LaunchFailed {
            node: node.to_string(),
            reason: reason.into(),
        }));
        Ok(())
    }

    /// `Running -> Completed | Failed` from the process exit code.
    ///
    /// On success the node is fed to [`GraphModel::mark_completed`] and the
    /// dependents it releases are queued (and returned). Queued nodes are
    /// still recorded while halted, but never handed out by
    /// [`RunCore::next_ready`].
    pub fn on_exited(&mut self, node: &str, exit_code: Option<i32>) -> Result<Vec<NodeName>> {
        self.expect_state(node, NodeState::Running)?;
        self.running.retain(|n| n != node);

        if exit_code != Some(0) {
            self.states.insert(node.to_string(), NodeState::Failed);
            self.failed.push(node.to_string());
            self.halt(Halt::Failed(RunFailure::NodeExecution {
                node: node.to_string(),
                exit_code,
            }));
            return Ok(Vec::new());
        }

        self.states.insert(node.to_string(), NodeState::Completed);
        self.completion_order.push(node.to_string());
        self.completed.insert(node.to_string());

        let newly_ready = self.graph.mark_completed(node)?;
        for name in &newly_ready {
            self.states.insert(name.clone(), NodeState::Ready);
            self.ready.push_back(name.clone());
        }

        Ok(newly_ready)
    }

    /// `Running -> Failed` for a node killed after exceeding its own timeout.
    /// Halts the run.
    pub fn on_node_timeout(&mut self, node: &str, limit: Duration) -> Result<()> {
        self.expect_state(node, NodeState::Running)?;
        self.running.retain(|n| n != node);
        self.states.insert(node.to_string(), NodeState::Failed);
        self.failed.push(node.to_string());
        self.halt(Halt::Failed(RunFailure::NodeTimeout {
            node: node.to_string(),
            limit,
        }));
        Ok(())
    }

    /// Nothing is running and nothing more will be admitted.
    pub fn is_finished(&self) -> bool {
        self.running.is_empty() && (self.halt.is_some() || self.ready.is_empty())
    }

    /// Final accounting.
    ///
    /// Without a halt reason, a run that did not complete every node means
    /// some node never reached in-degree zero: a graph structure failure,
    /// distinct from a node execution failure.
    pub fn finish(self) -> CoreOutcome {
        let status = match self.halt {
            Some(Halt::Failed(failure)) => RunStatus::Failed(failure),
            Some(Halt::TimedOut { deadline }) => RunStatus::TimedOut { deadline },
            None if self.graph.is_fully_resolved(&self.completed) => RunStatus::Succeeded,
            None => {
                let unresolved = self.graph.unresolved(&self.completed);
                RunStatus::Failed(RunFailure::GraphStructure {
                    reason: format!(
                        "nodes never became ready (cycle or undeclared prerequisite): {}",
                        unresolved.join(", ")
                    ),
                })
            }
        };

        let states: Vec<(NodeName, NodeState)> = self
            .graph
            .nodes()
            .map(|name| {
                let state = self.states.get(name).copied().unwrap_or(NodeState::Pending);
                (name.to_string(), state)
            })
            .collect();

        let never_launched = states
            .iter()
            .filter(|(_, state)| matches!(state, NodeState::Pending | NodeState::Ready))
            .map(|(name, _)| name.clone())
            .collect();

        CoreOutcome {
            status,
            launch_order: self.launch_order,
            completion_order: self.completion_order,
            failed: self.failed,
            never_launched,
            states,
        }
    }

    fn expect_state(&self, node: &str, expected: NodeState) -> Result<()> {
        match self.states.get(node) {
            None => Err(ProcdagError::UnknownNode(node.to_string())),
            Some(state) if *state == expected => Ok(()),
            Some(state) => Err(ProcdagError::Other(anyhow!(
                "node '{}' is {}, expected {}",
                node,
                state,
                expected
            ))),
        }
    }

    fn take_ready(&mut self, node: &str) {
        if let Some(pos) = self.ready.iter().position(|n| n == node) {
            self.ready.remove(pos);
        }
    }
}
