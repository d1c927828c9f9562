use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use procdag::errors::Result;
use procdag::resources::{MetricsSnapshot, MetricsSource, ResourceLimits};

/// A fake metrics source that replays a fixed sequence of snapshots and
/// then keeps returning the last one.
#[derive(Debug, Clone)]
pub struct ScriptedMetrics {
    snapshots: Vec<MetricsSnapshot>,
    samples: Arc<AtomicUsize>,
}

impl ScriptedMetrics {
    pub fn new(snapshots: Vec<MetricsSnapshot>) -> Self {
        Self {
            snapshots,
            samples: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A host that is always idle.
    pub fn idle() -> Self {
        Self::new(vec![MetricsSnapshot::default()])
    }

    /// Only CPU readings, one per sample.
    pub fn cpu(readings: &[f32]) -> Self {
        Self::new(
            readings
                .iter()
                .map(|&cpu| MetricsSnapshot {
                    cpu_percent: Some(cpu),
                    ..MetricsSnapshot::default()
                })
                .collect(),
        )
    }

    /// Shared counter of how many samples were taken.
    pub fn sample_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.samples)
    }
}

impl MetricsSource for ScriptedMetrics {
    fn sample<'a>(
        &'a mut self,
        _limits: &'a ResourceLimits,
    ) -> Pin<Box<dyn Future<Output = Result<MetricsSnapshot>> + Send + 'a>> {
        Box::pin(async move {
            let n = self.samples.fetch_add(1, Ordering::SeqCst);
            let snapshot = self
                .snapshots
                .get(n)
                .or_else(|| self.snapshots.last())
                .copied()
                .unwrap_or_default();
            Ok(snapshot)
        })
    }
}
