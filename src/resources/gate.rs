// src/resources/gate.rs

//! Admission control against host resource ceilings.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::errors::{ProcdagError, Result};
use crate::resources::limits::ResourceLimits;
use crate::resources::metrics::MetricsSource;

/// Blocks launches until the host is within the configured ceilings.
///
/// Sampling is poll-based: there is no portable push notification for CPU or
/// load changes, so the gate re-samples every `poll_interval` while any
/// metric is out of bounds.
pub struct ResourceGate<M: MetricsSource> {
    source: M,
    poll_interval: Duration,
}

impl<M: MetricsSource> ResourceGate<M> {
    pub fn new(source: M, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until every metric configured in `limits` is within bounds.
    ///
    /// - Returns immediately, without sampling, when `limits` configures no
    ///   metric.
    /// - Samples at least once, even if `deadline` has already passed.
    /// - Fails with [`ProcdagError::ResourceTimeout`] once `deadline` is
    ///   reached with some metric still out of bounds. Sleeps are clipped to
    ///   the deadline, so the overrun is bounded by one sample.
    pub async fn admit(&mut self, limits: &ResourceLimits, deadline: Option<Instant>) -> Result<()> {
        if limits.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let mut last_notice: Option<Instant> = None;

        loop {
            let snapshot = self.source.sample(limits).await?;
            let violations = limits.violations(&snapshot);

            if violations.is_empty() {
                let waited = started.elapsed();
                if !waited.is_zero() {
                    debug!(?waited, "resources available after waiting");
                }
                return Ok(());
            }

            let now = Instant::now();
            let remaining = match deadline {
                Some(deadline) if now >= deadline => {
                    return Err(ProcdagError::ResourceTimeout {
                        waited: now - started,
                    });
                }
                Some(deadline) => Some(deadline - now),
                None => None,
            };

            if last_notice.is_none_or(|at| now - at >= self.poll_interval) {
                let busy = violations
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                info!(%busy, "resources busy; waiting for availability");
                last_notice = Some(now);
            }

            let nap = match remaining {
                Some(remaining) => self.poll_interval.min(remaining),
                None => self.poll_interval,
            };
            tokio::time::sleep(nap).await;
        }
    }
}
