// src/resources/limits.rs

//! Host resource ceilings and the snapshot they are checked against.

use std::fmt;

use serde::Deserialize;

/// Optional ceilings on host metrics, from the `[resources]` section.
///
/// Each field is independent; `None` means "do not check this metric".
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct ResourceLimits {
    /// Maximum global CPU utilisation, in percent.
    #[serde(default)]
    pub cpu_percent: Option<f32>,
    /// Maximum memory utilisation, in percent.
    #[serde(default)]
    pub memory_percent: Option<f32>,
    /// Minimum free space on the execution volume, in MiB.
    #[serde(default)]
    pub disk_free_mb: Option<u64>,
    /// Maximum 1-minute load average. Ignored where the platform has none.
    #[serde(default)]
    pub load_avg_1m: Option<f64>,
}

impl ResourceLimits {
    /// True if no metric is configured.
    pub fn is_empty(&self) -> bool {
        self.cpu_percent.is_none()
            && self.memory_percent.is_none()
            && self.disk_free_mb.is_none()
            && self.load_avg_1m.is_none()
    }

    /// Range checks for configured values.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("cpu_percent", self.cpu_percent),
            ("memory_percent", self.memory_percent),
        ] {
            if let Some(v) = value {
                if !(v > 0.0 && v <= 100.0) {
                    return Err(format!("{name} must be in (0, 100] (got {v})"));
                }
            }
        }

        if let Some(load) = self.load_avg_1m {
            if !(load > 0.0) {
                return Err(format!("load_avg_1m must be > 0 (got {load})"));
            }
        }

        Ok(())
    }

    /// Compare a snapshot against the configured ceilings.
    ///
    /// A metric missing from the snapshot (not sampled, or unsupported on this
    /// platform) never counts as a violation.
    pub fn violations(&self, snapshot: &MetricsSnapshot) -> Vec<Violation> {
        let mut out = Vec::new();

        if let (Some(limit), Some(value)) = (self.cpu_percent, snapshot.cpu_percent) {
            if value > limit {
                out.push(Violation::Cpu { value, limit });
            }
        }
        if let (Some(limit), Some(value)) = (self.memory_percent, snapshot.memory_percent) {
            if value > limit {
                out.push(Violation::Memory { value, limit });
            }
        }
        if let (Some(limit), Some(value)) = (self.disk_free_mb, snapshot.disk_free_mb) {
            if value < limit {
                out.push(Violation::DiskFree { value, limit });
            }
        }
        if let (Some(limit), Some(value)) = (self.load_avg_1m, snapshot.load_avg_1m) {
            if value > limit {
                out.push(Violation::LoadAvg { value, limit });
            }
        }

        out
    }
}

/// Point-in-time host metrics. Only the metrics that were asked for are set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub cpu_percent: Option<f32>,
    pub memory_percent: Option<f32>,
    pub disk_free_mb: Option<u64>,
    pub load_avg_1m: Option<f64>,
}

/// A single metric that is over (or, for disk, under) its ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Violation {
    Cpu { value: f32, limit: f32 },
    Memory { value: f32, limit: f32 },
    DiskFree { value: u64, limit: u64 },
    LoadAvg { value: f64, limit: f64 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Cpu { value, limit } => write!(f, "cpu {value:.1}% > {limit:.1}%"),
            Violation::Memory { value, limit } => {
                write!(f, "memory {value:.1}% > {limit:.1}%")
            }
            Violation::DiskFree { value, limit } => {
                write!(f, "disk free {value} MiB < {limit} MiB")
            }
            Violation::LoadAvg { value, limit } => write!(f, "load1 {value:.2} > {limit:.2}"),
        }
    }
}
