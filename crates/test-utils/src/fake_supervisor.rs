use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use procdag::errors::{ProcdagError, Result};
use procdag::exec::{PollStatus, ProcessExit, ProcessHandle, ProcessSupervisor};

/// What happened to a node, in the order the supervisor saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Launched(String),
    Exited(String, Option<i32>),
    Killed(String),
}

/// Shared view of everything a [`ScriptedSupervisor`] did, readable after
/// the supervisor has been moved into a scheduler.
#[derive(Debug, Clone, Default)]
pub struct SupervisorLog {
    events: Arc<Mutex<Vec<SupervisorEvent>>>,
}

impl SupervisorLog {
    pub fn events(&self) -> Vec<SupervisorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn launched(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SupervisorEvent::Launched(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn killed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SupervisorEvent::Killed(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Highest number of nodes that were running at the same time.
    pub fn max_concurrency(&self) -> usize {
        let mut running = 0usize;
        let mut max = 0usize;
        for event in self.events() {
            match event {
                SupervisorEvent::Launched(_) => {
                    running += 1;
                    max = max.max(running);
                }
                SupervisorEvent::Exited(..) | SupervisorEvent::Killed(_) => {
                    running = running.saturating_sub(1);
                }
            }
        }
        max
    }

    /// Index of the first event matching `event`.
    pub fn position(&self, event: &SupervisorEvent) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    fn push(&self, event: SupervisorEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Debug, Clone)]
struct NodeScript {
    exit_code: Option<i32>,
    /// Number of polls answered with `StillRunning` before the exit.
    polls: u32,
    stdout: String,
    stderr: String,
}

impl Default for NodeScript {
    fn default() -> Self {
        Self {
            exit_code: Some(0),
            polls: 1,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// A fake supervisor that:
/// - never spawns anything
/// - lets each node exit with a scripted code after a scripted number of
///   polls (default: exit 0 after one `StillRunning`)
/// - records launches, exits and kills in a [`SupervisorLog`]
#[derive(Debug, Default)]
pub struct ScriptedSupervisor {
    scripts: HashMap<String, NodeScript>,
    launch_failures: HashSet<String>,
    remaining: HashMap<String, u32>,
    log: SupervisorLog,
}

impl ScriptedSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> SupervisorLog {
        self.log.clone()
    }

    /// `node` exits with `code` (`None` = killed by a signal).
    pub fn exit_code(mut self, node: &str, code: Option<i32>) -> Self {
        self.script(node).exit_code = code;
        self
    }

    /// `node` reports `StillRunning` for `polls` polls before exiting.
    pub fn polls(mut self, node: &str, polls: u32) -> Self {
        self.script(node).polls = polls;
        self
    }

    /// `node` never exits on its own.
    pub fn hangs(self, node: &str) -> Self {
        self.polls(node, u32::MAX)
    }

    pub fn stdout(mut self, node: &str, out: &str) -> Self {
        self.script(node).stdout = out.to_string();
        self
    }

    pub fn stderr(mut self, node: &str, err: &str) -> Self {
        self.script(node).stderr = err.to_string();
        self
    }

    /// `launch(node)` fails with `LaunchFailed`.
    pub fn fail_launch(mut self, node: &str) -> Self {
        self.launch_failures.insert(node.to_string());
        self
    }

    fn script(&mut self, node: &str) -> &mut NodeScript {
        self.scripts.entry(node.to_string()).or_default()
    }

    fn script_for(&self, node: &str) -> NodeScript {
        self.scripts.get(node).cloned().unwrap_or_default()
    }
}

impl ProcessSupervisor for ScriptedSupervisor {
    fn launch(&mut self, node: &str) -> Result<ProcessHandle> {
        if self.launch_failures.contains(node) {
            return Err(ProcdagError::LaunchFailed {
                node: node.to_string(),
                reason: "scripted launch failure".to_string(),
            });
        }

        let script = self.script_for(node);
        self.remaining.insert(node.to_string(), script.polls);
        self.log.push(SupervisorEvent::Launched(node.to_string()));
        Ok(ProcessHandle::new(node, None))
    }

    fn poll<'a>(
        &'a mut self,
        handle: &'a ProcessHandle,
    ) -> Pin<Box<dyn Future<Output = Result<PollStatus>> + Send + 'a>> {
        Box::pin(async move {
            let node = handle.node();
            let Some(remaining) = self.remaining.get_mut(node) else {
                return Err(ProcdagError::UnknownNode(node.to_string()));
            };

            if *remaining > 0 {
                *remaining -= 1;
                return Ok(PollStatus::StillRunning);
            }

            self.remaining.remove(node);
            let script = self.script_for(node);
            self.log
                .push(SupervisorEvent::Exited(node.to_string(), script.exit_code));

            Ok(PollStatus::Exited(ProcessExit {
                code: script.exit_code,
                stdout: script.stdout,
                stderr: script.stderr,
            }))
        })
    }

    fn kill<'a>(
        &'a mut self,
        handle: &'a ProcessHandle,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessExit>> + Send + 'a>> {
        Box::pin(async move {
            let node = handle.node();
            if self.remaining.remove(node).is_none() {
                return Err(ProcdagError::UnknownNode(node.to_string()));
            }
            self.log.push(SupervisorEvent::Killed(node.to_string()));
            Ok(ProcessExit {
                code: None,
                ..ProcessExit::default()
            })
        })
    }
}
