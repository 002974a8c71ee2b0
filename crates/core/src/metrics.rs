//! Prometheus metrics for the generation pipeline.
//!
//! This module provides metrics for:
//! - Stage jobs (processed, failed, duration)
//! - Saved artifacts
//! - Worker pools and stack depths
//! - Commit ingestion

use once_cell::sync::Lazy;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
};

// =============================================================================
// Stage Metrics
// =============================================================================

/// Jobs processed by stage and result.
pub static JOBS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("timelapse_jobs_processed_total", "Total jobs processed"),
        &["stage", "result"], // result: "ok", "fetch", "decode", "encode", "persistence"
    )
    .unwrap()
});

/// Job duration in seconds by stage.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("timelapse_job_duration_seconds", "Duration of a stage job")
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["stage"],
    )
    .unwrap()
});

/// Artifacts saved by kind.
pub static ARTIFACTS_SAVED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("timelapse_artifacts_saved_total", "Total artifacts saved"),
        &["kind"],
    )
    .unwrap()
});

/// Bytes written to the output directory.
pub static BYTES_SAVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("timelapse_bytes_saved_total", "Total artifact bytes written").unwrap()
});

// =============================================================================
// Pool Metrics
// =============================================================================

/// Live workers by stage.
pub static WORKERS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("timelapse_workers", "Number of workers per stage"),
        &["stage"],
    )
    .unwrap()
});

/// Pending jobs by stage, sampled at each statistics collection.
pub static STACK_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("timelapse_stack_depth", "Pending jobs per stage stack"),
        &["stage"],
    )
    .unwrap()
});

// =============================================================================
// Ingest Metrics
// =============================================================================

/// Commit records ingested.
pub static COMMITS_INGESTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("timelapse_commits_ingested_total", "Total commits ingested").unwrap()
});

/// Jobs designated by the router, by stage.
pub static JOBS_DESIGNATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("timelapse_jobs_designated_total", "Total jobs designated"),
        &["stage"],
    )
    .unwrap()
});

/// Whether a generation is running (0 or 1).
pub static GENERATION_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("timelapse_generation_running", "Whether generation is running").unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Stages
        Box::new(JOBS_PROCESSED.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(ARTIFACTS_SAVED.clone()),
        Box::new(BYTES_SAVED.clone()),
        // Pools
        Box::new(WORKERS.clone()),
        Box::new(STACK_DEPTH.clone()),
        // Ingest
        Box::new(COMMITS_INGESTED.clone()),
        Box::new(JOBS_DESIGNATED.clone()),
        Box::new(GENERATION_RUNNING.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        JOBS_PROCESSED.with_label_values(&["download", "ok"]).inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "timelapse_jobs_processed_total"));
    }
}
