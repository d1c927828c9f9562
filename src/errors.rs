// src/errors.rs

//! Crate-wide error type and exit-status mapping.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Node not found in graph: {0}")]
    UnknownNode(String),

    #[error("Node '{0}' was already marked completed")]
    DuplicateCompletion(String),

    /// Cycle or reference to an undeclared prerequisite.
    #[error("Graph structure error: {0}")]
    GraphStructure(String),

    #[error("Node '{node}' failed with exit code {}", exit_code_label(.exit_code))]
    NodeExecution { node: String, exit_code: Option<i32> },

    #[error("Node '{node}' could not be launched: {reason}")]
    LaunchFailed { node: String, reason: String },

    #[error("Node '{node}' exceeded its timeout of {limit:?} and was killed")]
    NodeTimeout { node: String, limit: Duration },

    #[error("Resources did not become available within {waited:?}")]
    ResourceTimeout { waited: Duration },

    #[error("Global deadline of {deadline:?} exceeded")]
    DeadlineExceeded { deadline: Duration },

    #[error("Another instance is already running (pid {pid})")]
    LockContention { pid: u32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcdagError {
    /// Process exit status for this error, distinct per fatal class so that
    /// operators can script on the outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcdagError::NodeExecution { .. }
            | ProcdagError::LaunchFailed { .. }
            | ProcdagError::NodeTimeout { .. } => 2,
            ProcdagError::GraphStructure(_) => 3,
            ProcdagError::ResourceTimeout { .. } => 4,
            ProcdagError::DeadlineExceeded { .. } => 5,
            ProcdagError::LockContention { .. } => 6,
            ProcdagError::ConfigError(_)
            | ProcdagError::IoError(_)
            | ProcdagError::TomlError(_)
            | ProcdagError::UnknownNode(_)
            | ProcdagError::DuplicateCompletion(_)
            | ProcdagError::Other(_) => 1,
        }
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "<signal>".to_string(),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProcdagError>;
