// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::resources::ResourceLimits;
use crate::types::NodeName;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// deadline_seconds = 600
///
/// [runner]
/// process_dir = "process_files"
/// interpreter = "python3"
///
/// [resources]
/// cpu_percent = 85.0
///
/// [node."extract.py"]
/// in = []
///
/// [node."load.py"]
/// in = ["extract.py"]
/// ```
///
/// Only `[node.*]` is required; everything else has defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global deadline in seconds from the start of the run.
    #[serde(default)]
    pub deadline_seconds: Option<u64>,

    #[serde(default)]
    pub runner: RunnerSection,

    /// Absent means "never gate on resources".
    #[serde(default)]
    pub resources: Option<ResourceLimits>,

    #[serde(default)]
    pub lock: LockSection,

    #[serde(default)]
    pub logging: LoggingSection,

    /// All nodes from `[node.<name>]`, keyed by node name.
    ///
    /// The `BTreeMap` ordering is the deterministic launch order for nodes
    /// that become ready at the same time.
    #[serde(default)]
    pub node: BTreeMap<NodeName, NodeConfig>,
}

/// Validated configuration.
///
/// Can only be obtained through `ConfigFile::try_from(RawConfigFile)`, which
/// runs the checks in `config::validate`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub deadline_seconds: Option<u64>,
    pub runner: RunnerSection,
    pub resources: Option<ResourceLimits>,
    pub lock: LockSection,
    pub logging: LoggingSection,
    pub node: BTreeMap<NodeName, NodeConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            deadline_seconds: raw.deadline_seconds,
            runner: raw.runner,
            resources: raw.resources,
            lock: raw.lock,
            logging: raw.logging,
            node: raw.node,
        }
    }

    /// Prerequisite map in the shape `GraphModel` consumes.
    pub fn prerequisites(&self) -> BTreeMap<NodeName, Vec<NodeName>> {
        self.node
            .iter()
            .map(|(name, node)| (name.clone(), node.prereqs.clone()))
            .collect()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_seconds.map(Duration::from_secs)
    }

    /// Resource ceilings that actually need checking.
    ///
    /// Returns `None` both when `[resources]` is absent and when it is present
    /// but configures no metric.
    pub fn effective_resources(&self) -> Option<&ResourceLimits> {
        self.resources.as_ref().filter(|limits| !limits.is_empty())
    }

    /// Rewrite relative paths so they are anchored at `base` (normally the
    /// directory containing the config file).
    pub fn resolve_paths(&mut self, base: &Path) {
        self.runner.process_dir = anchor(base, &self.runner.process_dir);
        self.lock.path = anchor(base, &self.lock.path);
        if let Some(dir) = self.logging.dir.take() {
            self.logging.dir = Some(anchor(base, &dir));
        }
    }
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// `[runner]` section: how node names turn into processes.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    /// Directory holding the node units; also the working directory of
    /// every launched process.
    #[serde(default = "default_process_dir")]
    pub process_dir: PathBuf,

    /// Optional interpreter; units run as `<interpreter> <process_dir>/<node>`.
    /// When absent the unit itself is executed.
    #[serde(default)]
    pub interpreter: Option<String>,

    /// Supervisor poll cadence in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Seconds between resource samples while the gate is closed.
    #[serde(default = "default_resource_poll_seconds")]
    pub resource_poll_seconds: u64,
}

fn default_process_dir() -> PathBuf {
    PathBuf::from("process_files")
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_resource_poll_seconds() -> u64 {
    5
}

impl RunnerSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn resource_poll_interval(&self) -> Duration {
        Duration::from_secs(self.resource_poll_seconds)
    }
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            process_dir: default_process_dir(),
            interpreter: None,
            poll_interval_ms: default_poll_interval_ms(),
            resource_poll_seconds: default_resource_poll_seconds(),
        }
    }
}

/// `[lock]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LockSection {
    #[serde(default = "default_lock_path")]
    pub path: PathBuf,
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("procdag.lock")
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            path: default_lock_path(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingSection {
    /// Directory for `main.log`, `error.log` and `benchmarks.log`.
    /// Console-only logging when absent.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// `[node.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NodeConfig {
    /// Prerequisites: this node waits for all nodes listed here.
    ///
    /// This is the TOML `in = ["A", "B"]` field (`after` is accepted too).
    #[serde(default, rename = "in", alias = "after")]
    pub prereqs: Vec<NodeName>,

    /// Optional wall-clock limit for this node's process.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Optional shell command replacing the default unit resolution.
    #[serde(default)]
    pub cmd: Option<String>,
}

impl NodeConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}
