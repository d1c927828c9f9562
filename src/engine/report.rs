// src/engine/report.rs

//! Outcome of a complete run.

use std::time::Duration;

use chrono::{DateTime, Local};

use crate::errors::{ProcdagError, Result};
use crate::types::{NodeName, NodeState};

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    /// Cycle, self-dependency or undeclared prerequisite.
    GraphStructure { reason: String },
    /// A node exited non-zero (or was killed by a signal).
    NodeExecution {
        node: NodeName,
        exit_code: Option<i32>,
    },
    /// A node could not be started.
    LaunchFailed { node: NodeName, reason: String },
    /// A node ran past its own `timeout_seconds` and was killed.
    NodeTimeout { node: NodeName, limit: Duration },
    /// The deadline passed while `node` was waiting for admission.
    ResourceTimeout { node: NodeName, waited: Duration },
    /// Bookkeeping or metric sampling broke down.
    Internal { reason: String },
}

impl From<RunFailure> for ProcdagError {
    fn from(failure: RunFailure) -> Self {
        match failure {
            RunFailure::GraphStructure { reason } => ProcdagError::GraphStructure(reason),
            RunFailure::NodeExecution { node, exit_code } => {
                ProcdagError::NodeExecution { node, exit_code }
            }
            RunFailure::LaunchFailed { node, reason } => {
                ProcdagError::LaunchFailed { node, reason }
            }
            RunFailure::NodeTimeout { node, limit } => ProcdagError::NodeTimeout { node, limit },
            RunFailure::ResourceTimeout { waited, .. } => ProcdagError::ResourceTimeout { waited },
            RunFailure::Internal { reason } => ProcdagError::Other(anyhow::anyhow!(reason)),
        }
    }
}

/// Final status of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed(RunFailure),
    /// The global deadline passed; no new nodes were admitted afterwards.
    TimedOut { deadline: Duration },
}

/// Per-node accounting: lifecycle state plus benchmark timings.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub node: NodeName,
    pub state: NodeState,
    pub started_at: Option<DateTime<Local>>,
    pub ended_at: Option<DateTime<Local>>,
    pub duration: Option<Duration>,
    pub exit_code: Option<i32>,
}

impl NodeRecord {
    pub fn new(node: impl Into<NodeName>) -> Self {
        Self {
            node: node.into(),
            state: NodeState::Pending,
            started_at: None,
            ended_at: None,
            duration: None,
            exit_code: None,
        }
    }

    pub fn was_launched(&self) -> bool {
        self.started_at.is_some()
    }
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    /// Nodes in the order they launched.
    pub launch_order: Vec<NodeName>,
    /// Nodes in the order they completed successfully.
    pub completion_order: Vec<NodeName>,
    pub failed: Vec<NodeName>,
    /// Nodes that never reached `Running`, in declaration order.
    pub never_launched: Vec<NodeName>,
    /// One record per node, in declaration order.
    pub records: Vec<NodeRecord>,
    pub duration: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn record(&self, node: &str) -> Option<&NodeRecord> {
        self.records.iter().find(|r| r.node == node)
    }

    pub fn state_of(&self, node: &str) -> Option<NodeState> {
        self.record(node).map(|r| r.state)
    }

    /// `Ok(self)` for a successful run; otherwise the error matching the
    /// failure class.
    pub fn into_result(self) -> Result<RunReport> {
        match self.status {
            RunStatus::Succeeded => Ok(self),
            RunStatus::Failed(failure) => Err(failure.into()),
            RunStatus::TimedOut { deadline } => Err(ProcdagError::DeadlineExceeded { deadline }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: RunStatus) -> RunReport {
        RunReport {
            status,
            launch_order: Vec::new(),
            completion_order: Vec::new(),
            failed: Vec::new(),
            never_launched: Vec::new(),
            records: vec![NodeRecord::new("A")],
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn failures_map_to_matching_errors() {
        let err = report(RunStatus::Failed(RunFailure::GraphStructure {
            reason: "cycle".into(),
        }))
        .into_result()
        .unwrap_err();
        assert!(matches!(err, ProcdagError::GraphStructure(_)));
        assert_eq!(err.exit_code(), 3);

        let err = report(RunStatus::TimedOut {
            deadline: Duration::from_secs(3),
        })
        .into_result()
        .unwrap_err();
        assert!(matches!(err, ProcdagError::DeadlineExceeded { .. }));

        let err = report(RunStatus::Failed(RunFailure::ResourceTimeout {
            node: "A".into(),
            waited: Duration::from_secs(1),
        }))
        .into_result()
        .unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn success_passes_report_through() {
        let ok = report(RunStatus::Succeeded).into_result().unwrap();
        assert_eq!(ok.state_of("A"), Some(NodeState::Pending));
        assert!(ok.record("B").is_none());
    }
}
