// src/resources/mod.rs

//! Host resource admission.
//!
//! - [`limits`] holds the configured ceilings and the snapshot comparison.
//! - [`metrics`] provides the `MetricsSource` trait and the `sysinfo`-backed
//!   `SystemMetrics` used in production.
//! - [`gate`] is the `ResourceGate` that blocks launches until the host is
//!   within bounds or the deadline passes.

pub mod gate;
pub mod limits;
pub mod metrics;

pub use gate::ResourceGate;
pub use limits::{MetricsSnapshot, ResourceLimits, Violation};
pub use metrics::{MetricsSource, SystemMetrics};
