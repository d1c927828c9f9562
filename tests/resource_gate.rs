// tests/resource_gate.rs

mod common;
use crate::common::{init_tracing, ScriptedMetrics};

use std::sync::atomic::Ordering;
use std::time::Duration;

use procdag::errors::ProcdagError;
use procdag::resources::{MetricsSnapshot, ResourceGate, ResourceLimits};
use tokio::time::Instant;

fn cpu_limit(limit: f32) -> ResourceLimits {
    ResourceLimits {
        cpu_percent: Some(limit),
        ..ResourceLimits::default()
    }
}

#[tokio::test(start_paused = true)]
async fn empty_limits_admit_without_sampling() {
    init_tracing();
    let metrics = ScriptedMetrics::cpu(&[100.0]);
    let samples = metrics.sample_counter();
    let mut gate = ResourceGate::new(metrics, Duration::from_secs(5));

    gate.admit(&ResourceLimits::default(), None).await.unwrap();
    assert_eq!(samples.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn samples_at_least_once_even_past_the_deadline() {
    init_tracing();
    let metrics = ScriptedMetrics::cpu(&[10.0]);
    let samples = metrics.sample_counter();
    let mut gate = ResourceGate::new(metrics, Duration::from_secs(5));

    let already_passed = Instant::now();
    tokio::time::advance(Duration::from_millis(1)).await;

    gate.admit(&cpu_limit(50.0), Some(already_passed)).await.unwrap();
    assert_eq!(samples.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn waits_one_interval_per_busy_sample() {
    init_tracing();
    let metrics = ScriptedMetrics::cpu(&[80.0, 80.0, 80.0, 20.0]);
    let samples = metrics.sample_counter();
    let mut gate = ResourceGate::new(metrics, Duration::from_secs(2));

    let start = Instant::now();
    gate.admit(&cpu_limit(50.0), None).await.unwrap();

    assert_eq!(samples.load(Ordering::SeqCst), 4);
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(6) && waited < Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn deadline_turns_waiting_into_resource_timeout() {
    init_tracing();
    let metrics = ScriptedMetrics::cpu(&[99.0]);
    let mut gate = ResourceGate::new(metrics, Duration::from_secs(5));

    let start = Instant::now();
    let deadline = start + Duration::from_secs(7);
    let err = gate.admit(&cpu_limit(50.0), Some(deadline)).await.unwrap_err();

    match err {
        ProcdagError::ResourceTimeout { waited } => {
            // 5s nap, then a nap clipped to the remaining 2s.
            assert!(waited >= Duration::from_secs(7) && waited < Duration::from_secs(8));
        }
        other => panic!("expected ResourceTimeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn every_configured_metric_must_be_within_bounds() {
    init_tracing();
    let limits = ResourceLimits {
        cpu_percent: Some(50.0),
        memory_percent: Some(80.0),
        disk_free_mb: Some(1024),
        load_avg_1m: None,
    };
    let calm_cpu_but_low_disk = MetricsSnapshot {
        cpu_percent: Some(5.0),
        memory_percent: Some(10.0),
        disk_free_mb: Some(100),
        load_avg_1m: None,
    };
    let all_fine = MetricsSnapshot {
        disk_free_mb: Some(4096),
        ..calm_cpu_but_low_disk
    };
    let metrics = ScriptedMetrics::new(vec![calm_cpu_but_low_disk, all_fine]);
    let samples = metrics.sample_counter();
    let mut gate = ResourceGate::new(metrics, Duration::from_secs(1));

    gate.admit(&limits, None).await.unwrap();
    assert_eq!(samples.load(Ordering::SeqCst), 2);
}
