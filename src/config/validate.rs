// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ProcdagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ProcdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_nodes(cfg)?;
    validate_runner(cfg)?;
    validate_resources(cfg)?;
    validate_nodes(cfg)?;
    Ok(())
}

fn ensure_has_nodes(cfg: &RawConfigFile) -> Result<()> {
    if cfg.node.is_empty() {
        return Err(ProcdagError::ConfigError(
            "config must contain at least one [node.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_runner(cfg: &RawConfigFile) -> Result<()> {
    if cfg.runner.poll_interval_ms == 0 {
        return Err(ProcdagError::ConfigError(
            "[runner].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.runner.resource_poll_seconds == 0 {
        return Err(ProcdagError::ConfigError(
            "[runner].resource_poll_seconds must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_resources(cfg: &RawConfigFile) -> Result<()> {
    match cfg.resources {
        Some(ref limits) => limits
            .validate()
            .map_err(|msg| ProcdagError::ConfigError(format!("[resources]: {msg}"))),
        None => Ok(()),
    }
}

fn validate_nodes(cfg: &RawConfigFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        if name.trim().is_empty() {
            return Err(ProcdagError::ConfigError(
                "node names must not be empty".to_string(),
            ));
        }
        if node.timeout_seconds == Some(0) {
            return Err(ProcdagError::ConfigError(format!(
                "node '{}' has timeout_seconds = 0; omit it to disable the per-node timeout",
                name
            )));
        }
        if let Some(cmd) = node.cmd.as_deref() {
            if cmd.trim().is_empty() {
                return Err(ProcdagError::ConfigError(format!(
                    "node '{}' has an empty `cmd`",
                    name
                )));
            }
        }
    }
    Ok(())
}
