//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Intake (accepted/rejected uploads, publish failures)
//! - Workers (tasks by outcome, transform duration, redeliveries)
//! - Backlog recovery (republished tasks)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Intake
// =============================================================================

/// Upload requests by result.
pub static INTAKE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("imgpipe_intake_total", "Total upload requests"),
        &["result"], // "accepted", "rejected", "error"
    )
    .unwrap()
});

/// Publishes that failed after all retries.
pub static PUBLISH_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "imgpipe_publish_failures_total",
        "Task publishes that failed after retries",
    )
    .unwrap()
});

// =============================================================================
// Workers
// =============================================================================

/// Tasks handled by workers, by outcome.
pub static TASKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("imgpipe_tasks_total", "Tasks handled by workers"),
        &["outcome"], // "processed", "failed", "skipped", "dead_lettered"
    )
    .unwrap()
});

/// Task failures by pipeline stage.
pub static TASK_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("imgpipe_task_failures_total", "Task failures by stage"),
        &["stage"], // "decode", "claim", "read", "transform", "timeout", "write", "status", "commit"
    )
    .unwrap()
});

/// Time spent in decode/transform/encode.
pub static TRANSFORM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "imgpipe_transform_duration_seconds",
            "Duration of the image transform",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["format"],
    )
    .unwrap()
});

/// Messages seen again after a previous delivery.
pub static REDELIVERIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "imgpipe_redeliveries_total",
        "Messages for tasks already past created",
    )
    .unwrap()
});

// =============================================================================
// Recovery
// =============================================================================

/// Tasks republished by the backlog sweep.
pub static BACKLOG_REPUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "imgpipe_backlog_republished_total",
            "Tasks republished by backlog recovery",
        ),
        &["result"], // "ok", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(INTAKE_TOTAL.clone()),
        Box::new(PUBLISH_FAILURES.clone()),
        Box::new(TASKS_TOTAL.clone()),
        Box::new(TASK_FAILURES.clone()),
        Box::new(TRANSFORM_DURATION.clone()),
        Box::new(REDELIVERIES.clone()),
        Box::new(BACKLOG_REPUBLISHED.clone()),
    ]
}
