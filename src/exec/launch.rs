// src/exec/launch.rs

//! Resolution of a node name to something that can be spawned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::model::ConfigFile;
use crate::errors::{ProcdagError, Result};
use crate::types::NodeName;

/// Fully resolved process invocation for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl LaunchSpec {
    /// Build the `tokio` command: piped stdout/stderr, no stdin, and the
    /// child is killed if its handle is dropped without being reaped.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(|a| a.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Maps node names to launch specifications.
///
/// - A node with a `cmd` runs it through the platform shell.
/// - Otherwise the node name is a file under `process_dir`, run with the
///   configured interpreter or executed directly.
///
/// Every process runs with `process_dir` as its working directory.
#[derive(Debug, Clone)]
pub struct UnitResolver {
    process_dir: PathBuf,
    interpreter: Option<String>,
    commands: HashMap<NodeName, String>,
}

impl UnitResolver {
    pub fn new(process_dir: impl Into<PathBuf>, interpreter: Option<String>) -> Self {
        Self {
            process_dir: process_dir.into(),
            interpreter,
            commands: HashMap::new(),
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut resolver = Self::new(&cfg.runner.process_dir, cfg.runner.interpreter.clone());
        for (name, node) in cfg.node.iter() {
            if let Some(cmd) = node.cmd.as_ref() {
                resolver = resolver.with_command(name, cmd);
            }
        }
        resolver
    }

    /// Run `node` as a shell command instead of resolving a unit file.
    pub fn with_command(mut self, node: impl Into<NodeName>, cmd: impl Into<String>) -> Self {
        self.commands.insert(node.into(), cmd.into());
        self
    }

    pub fn process_dir(&self) -> &Path {
        &self.process_dir
    }

    pub fn resolve(&self, node: &str) -> Result<LaunchSpec> {
        if let Some(cmd) = self.commands.get(node) {
            return Ok(self.shell_spec(cmd));
        }

        let unit = self.process_dir.join(node);
        if !unit.is_file() {
            return Err(ProcdagError::LaunchFailed {
                node: node.to_string(),
                reason: format!("unit file {} not found", unit.display()),
            });
        }

        let unit = unit.to_string_lossy().into_owned();
        let spec = match self.interpreter.as_ref() {
            Some(interpreter) => LaunchSpec {
                program: interpreter.clone(),
                args: vec![unit],
                cwd: self.process_dir.clone(),
            },
            None => LaunchSpec {
                program: unit,
                args: Vec::new(),
                cwd: self.process_dir.clone(),
            },
        };

        Ok(spec)
    }

    fn shell_spec(&self, cmd: &str) -> LaunchSpec {
        let (program, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };
        LaunchSpec {
            program: program.to_string(),
            args: vec![flag.to_string(), cmd.to_string()],
            cwd: self.process_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_runs_under_interpreter_in_process_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "print('a')\n").unwrap();

        let resolver = UnitResolver::new(dir.path(), Some("python3".to_string()));
        let spec = resolver.resolve("a.py").unwrap();

        assert_eq!(spec.program, "python3");
        assert_eq!(spec.args, vec![dir.path().join("a.py").to_string_lossy().into_owned()]);
        assert_eq!(spec.cwd, dir.path());
    }

    #[test]
    fn unit_without_interpreter_is_executed_directly() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("job"), "").unwrap();

        let spec = UnitResolver::new(dir.path(), None).resolve("job").unwrap();
        assert_eq!(spec.program, dir.path().join("job").to_string_lossy());
        assert!(spec.args.is_empty());
    }

    #[test]
    fn missing_unit_is_a_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = UnitResolver::new(dir.path(), None);

        match resolver.resolve("ghost.py") {
            Err(ProcdagError::LaunchFailed { node, reason }) => {
                assert_eq!(node, "ghost.py");
                assert!(reason.contains("not found"));
            }
            other => panic!("expected LaunchFailed, got {other:?}"),
        }
    }

    #[test]
    fn command_override_uses_shell_and_skips_file_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = UnitResolver::new(dir.path(), None).with_command("B", "echo hi");

        let spec = resolver.resolve("B").unwrap();
        assert_eq!(spec.args.last().map(String::as_str), Some("echo hi"));
        assert_eq!(spec.cwd, dir.path());
        assert!(spec.display().ends_with("echo hi"));
    }
}
