// src/engine/mod.rs

//! Run orchestration.
//!
//! The pure state machine lives in [`core`]; the async control loop that
//! launches, polls and gates processes is [`scheduler`]. [`report`] holds
//! the final accounting handed back to the caller.

pub mod core;
pub mod report;
pub mod scheduler;

pub use core::{CoreOutcome, Halt, RunCore};
pub use report::{NodeRecord, RunFailure, RunReport, RunStatus};
pub use scheduler::{Scheduler, SchedulerOptions};
