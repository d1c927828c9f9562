// src/exec/supervisor.rs

//! Process supervision.
//!
//! The scheduler talks to a `ProcessSupervisor` instead of spawning
//! processes itself. This keeps the control loop testable with a scripted
//! supervisor while production uses [`OsSupervisor`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::process::ExitStatus;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{ProcdagError, Result};
use crate::exec::launch::UnitResolver;
use crate::types::NodeName;

/// How long output pipes may stay open after the child exited. A grandchild
/// that inherited the pipes can keep them open indefinitely.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Time a single poll spends waiting for the readers right after the exit
/// was observed. Anything slower is picked up by later polls.
const OUTPUT_SETTLE: Duration = Duration::from_millis(20);

/// Handle for a launched node, returned by [`ProcessSupervisor::launch`].
///
/// The handle only identifies the process; the OS resources stay owned by
/// the supervisor until the exit status has been consumed through `poll`.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    node: NodeName,
    pid: Option<u32>,
    started: Instant,
    started_at: DateTime<Local>,
}

impl ProcessHandle {
    pub fn new(node: impl Into<NodeName>, pid: Option<u32>) -> Self {
        Self {
            node: node.into(),
            pid,
            started: Instant::now(),
            started_at: Local::now(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Exit status and captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessExit {
    /// Exit code 0 is the only success signal.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Result of a non-blocking poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    StillRunning,
    Exited(ProcessExit),
}

/// Trait abstracting how nodes are run as external processes.
///
/// Production code uses [`OsSupervisor`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait ProcessSupervisor: Send {
    /// Start the node's unit without waiting for it.
    fn launch(&mut self, node: &str) -> Result<ProcessHandle>;

    /// Non-blocking status check. Once this has returned
    /// [`PollStatus::Exited`] the process is reaped and the handle is dead.
    fn poll<'a>(
        &'a mut self,
        handle: &'a ProcessHandle,
    ) -> Pin<Box<dyn Future<Output = Result<PollStatus>> + Send + 'a>>;

    /// Forcefully stop the process and reap it.
    fn kill<'a>(
        &'a mut self,
        handle: &'a ProcessHandle,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessExit>> + Send + 'a>>;
}

/// A live child process plus the tasks draining its output pipes.
struct RunningProcess {
    child: Child,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
    /// Set once `try_wait` saw the exit while the pipes were still open.
    exited: Option<(ExitStatus, Instant)>,
}

impl RunningProcess {
    fn output_drained(&self) -> bool {
        self.stdout.as_ref().is_none_or(JoinHandle::is_finished)
            && self.stderr.as_ref().is_none_or(JoinHandle::is_finished)
    }

    async fn settle_output(&mut self) {
        let until = Instant::now() + OUTPUT_SETTLE;
        while !self.output_drained() && Instant::now() < until {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

/// Supervisor backed by real OS processes (`tokio::process`).
pub struct OsSupervisor {
    resolver: UnitResolver,
    live: HashMap<NodeName, RunningProcess>,
}

impl OsSupervisor {
    pub fn new(resolver: UnitResolver) -> Self {
        Self {
            resolver,
            live: HashMap::new(),
        }
    }

    /// Number of processes launched but not yet reaped.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn take_live(&mut self, handle: &ProcessHandle) -> Result<RunningProcess> {
        self.live
            .remove(handle.node())
            .ok_or_else(|| ProcdagError::UnknownNode(handle.node().to_string()))
    }
}

impl ProcessSupervisor for OsSupervisor {
    fn launch(&mut self, node: &str) -> Result<ProcessHandle> {
        if self.live.contains_key(node) {
            return Err(ProcdagError::LaunchFailed {
                node: node.to_string(),
                reason: "node already has a live process".to_string(),
            });
        }

        let spec = self.resolver.resolve(node)?;
        info!(node = %node, cmd = %spec.display(), "starting node process");

        let mut child = spec
            .to_command()
            .spawn()
            .map_err(|e| ProcdagError::LaunchFailed {
                node: node.to_string(),
                reason: e.to_string(),
            })?;

        let stdout = child.stdout.take().map(capture);
        let stderr = child.stderr.take().map(capture);
        let handle = ProcessHandle::new(node, child.id());

        self.live.insert(
            node.to_string(),
            RunningProcess {
                child,
                stdout,
                stderr,
                exited: None,
            },
        );

        Ok(handle)
    }

    fn poll<'a>(
        &'a mut self,
        handle: &'a ProcessHandle,
    ) -> Pin<Box<dyn Future<Output = Result<PollStatus>> + Send + 'a>> {
        Box::pin(async move {
            let Some(running) = self.live.get_mut(handle.node()) else {
                return Err(ProcdagError::UnknownNode(handle.node().to_string()));
            };

            let (status, exited_at) = match running.exited {
                Some(exited) => exited,
                None => {
                    let Some(status) = running.child.try_wait()? else {
                        return Ok(PollStatus::StillRunning);
                    };
                    let exited = (status, Instant::now());
                    running.exited = Some(exited);
                    running.settle_output().await;
                    exited
                }
            };

            // Keep the other nodes moving while a grandchild holds the pipes.
            if !running.output_drained() && exited_at.elapsed() < OUTPUT_GRACE {
                return Ok(PollStatus::StillRunning);
            }

            let running = self.take_live(handle)?;
            let stdout = collect(running.stdout, handle.node(), "stdout").await;
            let stderr = collect(running.stderr, handle.node(), "stderr").await;

            debug!(
                node = %handle.node(),
                pid = ?handle.pid(),
                exit_code = ?status.code(),
                "node process reaped"
            );

            Ok(PollStatus::Exited(ProcessExit {
                code: status.code(),
                stdout,
                stderr,
            }))
        })
    }

    fn kill<'a>(
        &'a mut self,
        handle: &'a ProcessHandle,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessExit>> + Send + 'a>> {
        Box::pin(async move {
            let mut running = self.take_live(handle)?;

            let code = match running.exited {
                Some((status, _)) => status.code(),
                None => {
                    if let Err(e) = running.child.kill().await {
                        warn!(
                            node = %handle.node(),
                            error = %e,
                            "failed to kill node process"
                        );
                    }
                    running.child.wait().await?.code()
                }
            };
            running.settle_output().await;

            let stdout = collect(running.stdout, handle.node(), "stdout").await;
            let stderr = collect(running.stderr, handle.node(), "stderr").await;

            Ok(ProcessExit {
                code,
                stdout,
                stderr,
            })
        })
    }
}

impl Drop for OsSupervisor {
    fn drop(&mut self) {
        // `kill_on_drop` takes care of the processes themselves.
        for node in self.live.keys() {
            warn!(node = %node, "supervisor dropped with live process; killing it");
        }
    }
}

/// Drain a pipe to a string in the background so the child never blocks on
/// a full pipe buffer.
fn capture<R>(stream: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut stream = stream;
        let mut buf = Vec::new();
        if let Err(e) = stream.read_to_end(&mut buf).await {
            debug!(error = %e, "error while reading node output");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Take whatever a reader task produced. Readers still blocked on an open
/// pipe are aborted and their output is dropped.
async fn collect(task: Option<JoinHandle<String>>, node: &str, stream: &str) -> String {
    let Some(task) = task else {
        return String::new();
    };

    if !task.is_finished() {
        task.abort();
        warn!(
            node = %node,
            stream,
            "output pipe still open after exit; discarding captured output"
        );
        return String::new();
    }

    match task.await {
        Ok(output) => output,
        Err(e) => {
            warn!(node = %node, stream, error = %e, "output reader task failed");
            String::new()
        }
    }
}
