use std::fmt;

/// Canonical node name type used throughout the crate.
pub type NodeName = String;

/// Lifecycle state of a single node within a run.
///
/// Transitions are one-way: `Pending -> Ready -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting on at least one prerequisite.
    Pending,
    /// All prerequisites completed; waiting for admission.
    Ready,
    /// Launched and being polled.
    Running,
    Completed,
    Failed,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Pending => "pending",
            NodeState::Ready => "ready",
            NodeState::Running => "running",
            NodeState::Completed => "completed",
            NodeState::Failed => "failed",
        };
        f.write_str(s)
    }
}
