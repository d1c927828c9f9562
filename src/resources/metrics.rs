// src/resources/metrics.rs

//! Host metric sampling.
//!
//! The gate talks to a `MetricsSource` instead of calling `sysinfo`
//! directly, so tests can script metric values without depending on the
//! state of the machine running them.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Instant;

use sysinfo::{Disks, MINIMUM_CPU_UPDATE_INTERVAL, System};
use tracing::{debug, trace};

use crate::errors::Result;
use crate::resources::limits::{MetricsSnapshot, ResourceLimits};

/// Source of host metric snapshots.
pub trait MetricsSource: Send {
    /// Sample the metrics that `limits` configures. Metrics without a
    /// ceiling must be left as `None` and should not be measured at all.
    fn sample<'a>(
        &'a mut self,
        limits: &'a ResourceLimits,
    ) -> Pin<Box<dyn Future<Output = Result<MetricsSnapshot>> + Send + 'a>>;
}

/// `sysinfo`-backed metrics for the local host.
///
/// Disk space is measured on the volume holding `volume` (the process
/// directory nodes run in).
pub struct SystemMetrics {
    system: System,
    volume: PathBuf,
    last_cpu_refresh: Option<Instant>,
}

impl SystemMetrics {
    pub fn new(volume: impl Into<PathBuf>) -> Self {
        Self {
            system: System::new(),
            volume: volume.into(),
            last_cpu_refresh: None,
        }
    }

    /// CPU usage needs two refreshes at least `MINIMUM_CPU_UPDATE_INTERVAL`
    /// apart. Between gate polls the previous refresh serves as the first one.
    async fn sample_cpu(&mut self) -> f32 {
        match self.last_cpu_refresh {
            Some(at) => {
                let wait = MINIMUM_CPU_UPDATE_INTERVAL.saturating_sub(at.elapsed());
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
            }
            None => {
                self.system.refresh_cpu_usage();
                tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
            }
        }

        self.system.refresh_cpu_usage();
        self.last_cpu_refresh = Some(Instant::now());
        self.system.global_cpu_usage()
    }

    fn sample_memory(&mut self) -> Option<f32> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return None;
        }
        Some((self.system.used_memory() as f64 * 100.0 / total as f64) as f32)
    }

    fn sample_disk_free_mb(&self) -> Result<Option<u64>> {
        let target = self.volume.canonicalize()?;
        let disks = Disks::new_with_refreshed_list();

        let free = free_space_for(
            &target,
            disks
                .list()
                .iter()
                .map(|d| (d.mount_point(), d.available_space())),
        );
        if free.is_none() {
            debug!(
                volume = %target.display(),
                "no mounted disk matches volume; skipping disk check"
            );
        }

        Ok(free.map(|bytes| bytes / (1024 * 1024)))
    }

    fn sample_load_avg(&self) -> Option<f64> {
        if cfg!(windows) {
            return None;
        }
        Some(System::load_average().one)
    }
}

/// Free bytes on the mount with the longest mount point that contains `target`.
fn free_space_for<'a>(
    target: &Path,
    mounts: impl Iterator<Item = (&'a Path, u64)>,
) -> Option<u64> {
    mounts
        .filter(|(mount, _)| target.starts_with(mount))
        .max_by_key(|(mount, _)| mount.as_os_str().len())
        .map(|(_, free)| free)
}

impl MetricsSource for SystemMetrics {
    fn sample<'a>(
        &'a mut self,
        limits: &'a ResourceLimits,
    ) -> Pin<Box<dyn Future<Output = Result<MetricsSnapshot>> + Send + 'a>> {
        Box::pin(async move {
            let mut snapshot = MetricsSnapshot::default();

            if limits.cpu_percent.is_some() {
                snapshot.cpu_percent = Some(self.sample_cpu().await);
            }
            if limits.memory_percent.is_some() {
                snapshot.memory_percent = self.sample_memory();
            }
            if limits.disk_free_mb.is_some() {
                snapshot.disk_free_mb = self.sample_disk_free_mb()?;
            }
            if limits.load_avg_1m.is_some() {
                snapshot.load_avg_1m = self.sample_load_avg();
            }

            trace!(?snapshot, "sampled host metrics");
            Ok(snapshot)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_matching_mount_wins() {
        let mounts = vec![
            (Path::new("/"), 10u64),
            (Path::new("/data"), 20u64),
            (Path::new("/data/scratch"), 30u64),
        ];

        let free = free_space_for(
            Path::new("/data/jobs/process_files"),
            mounts.iter().map(|(p, f)| (*p, *f)),
        );
        assert_eq!(free, Some(20));
    }

    #[test]
    fn no_matching_mount_yields_none() {
        let mounts = vec![(Path::new("/mnt/other"), 10u64)];
        let free = free_space_for(Path::new("/srv"), mounts.iter().map(|(p, f)| (*p, *f)));
        assert_eq!(free, None);
    }

    #[tokio::test]
    async fn unconfigured_metrics_are_not_sampled() {
        let dir = std::env::temp_dir();
        let mut metrics = SystemMetrics::new(&dir);
        let limits = ResourceLimits {
            memory_percent: Some(100.0),
            ..Default::default()
        };

        let snapshot = metrics.sample(&limits).await.unwrap();
        assert!(snapshot.cpu_percent.is_none());
        assert!(snapshot.disk_free_mb.is_none());
        assert!(snapshot.load_avg_1m.is_none());
    }
}
