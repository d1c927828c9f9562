// src/config/mod.rs

//! Configuration loading and validation for procdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate value ranges before a run is attempted (`validate.rs`).
//!
//! Graph structure (cycles, undeclared prerequisites) is deliberately left to
//! `dag::GraphModel::validate` so that it surfaces as a graph error rather
//! than a config error.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_root_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, LockSection, LoggingSection, NodeConfig, RawConfigFile, RunnerSection,
};
