// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path, validate it, and anchor relative
/// paths (`process_dir`, lock file, log dir) at the config file's directory.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let mut config = ConfigFile::try_from(raw_config)?;
    config.resolve_paths(&config_root_dir(path));

    debug!(
        path = %path.display(),
        nodes = config.node.len(),
        "loaded configuration"
    );

    Ok(config)
}

/// Default config location: `Procdag.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Procdag.toml")
}

/// Directory that relative config paths are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "jobs/Procdag.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Procdag.toml" (parent = ""),
///   we fall back to the current working directory "."
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
