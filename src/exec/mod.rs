// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`launch`] resolves a node name to a program, arguments and working
//!   directory.
//! - [`supervisor`] provides the `ProcessSupervisor` trait (launch / poll /
//!   kill) and the `OsSupervisor` that runs real processes with
//!   `tokio::process`, capturing their stdout and stderr.

pub mod launch;
pub mod supervisor;

pub use launch::{LaunchSpec, UnitResolver};
pub use supervisor::{OsSupervisor, PollStatus, ProcessExit, ProcessHandle, ProcessSupervisor};
