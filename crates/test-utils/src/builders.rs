#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use procdag::config::{
    ConfigFile, LockSection, LoggingSection, NodeConfig, RawConfigFile, RunnerSection,
};
use procdag::resources::ResourceLimits;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                deadline_seconds: None,
                runner: RunnerSection::default(),
                resources: None,
                lock: LockSection::default(),
                logging: LoggingSection::default(),
                node: BTreeMap::new(),
            },
        }
    }

    pub fn with_node(mut self, name: &str, node: NodeConfig) -> Self {
        self.config.node.insert(name.to_string(), node);
        self
    }

    /// Shorthand for a node with only prerequisites.
    pub fn node(self, name: &str, prereqs: &[&str]) -> Self {
        let mut builder = NodeConfigBuilder::new();
        for p in prereqs {
            builder = builder.after(p);
        }
        self.with_node(name, builder.build())
    }

    pub fn deadline_seconds(mut self, secs: u64) -> Self {
        self.config.deadline_seconds = Some(secs);
        self
    }

    pub fn process_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.runner.process_dir = dir.into();
        self
    }

    pub fn interpreter(mut self, interpreter: &str) -> Self {
        self.config.runner.interpreter = Some(interpreter.to_string());
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.runner.poll_interval_ms = ms;
        self
    }

    pub fn resource_poll_seconds(mut self, secs: u64) -> Self {
        self.config.runner.resource_poll_seconds = secs;
        self
    }

    pub fn resources(mut self, limits: ResourceLimits) -> Self {
        self.config.resources = Some(limits);
        self
    }

    pub fn lock_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.lock.path = path.into();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeConfig`.
pub struct NodeConfigBuilder {
    node: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new() -> Self {
        Self {
            node: NodeConfig::default(),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.node.prereqs.push(dep.to_string());
        self
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.node.cmd = Some(cmd.to_string());
        self
    }

    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.node.timeout_seconds = Some(secs);
        self
    }

    pub fn build(self) -> NodeConfig {
        self.node
    }
}

impl Default for NodeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
