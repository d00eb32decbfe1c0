//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Batches (runs by result, duration, in progress)
//! - Items (outcomes)
//! - Transformer calls (results, duration)
//! - Archive output (bytes handed to sinks)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Batch Metrics
// =============================================================================

/// Batches finished by result.
pub static BATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("streambatch_batches_total", "Total batches run"),
        &["result"], // "completed", "aborted", "declined"
    )
    .unwrap()
});

/// Batch wall-clock duration in seconds.
pub static BATCH_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "streambatch_batch_duration_seconds",
            "Duration of a batch run",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &["result"],
    )
    .unwrap()
});

/// Batches currently running.
pub static BATCHES_IN_PROGRESS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "streambatch_batches_in_progress",
        "Number of batches currently running",
    )
    .unwrap()
});

// =============================================================================
// Item Metrics
// =============================================================================

/// Items processed by outcome.
pub static ITEMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("streambatch_items_total", "Total items processed"),
        &["outcome"], // "succeeded", "failed", "skipped"
    )
    .unwrap()
});

// =============================================================================
// Transformer Metrics
// =============================================================================

/// Transformer calls by result or error kind.
pub static TRANSFORM_CALLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streambatch_transform_calls_total",
            "Total transformer calls",
        ),
        &["result"], // "success", "rejected", "timeout", "panicked", ...
    )
    .unwrap()
});

/// Transformer call duration in seconds.
pub static TRANSFORM_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "streambatch_transform_duration_seconds",
            "Duration of a single transformer call",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

// =============================================================================
// Archive Metrics
// =============================================================================

/// Archive bytes accepted by sinks.
pub static ARCHIVE_BYTES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "streambatch_archive_bytes_total",
        "Total archive bytes written to sinks",
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Batches
        Box::new(BATCHES_TOTAL.clone()),
        Box::new(BATCH_DURATION_SECONDS.clone()),
        Box::new(BATCHES_IN_PROGRESS.clone()),
        // Items
        Box::new(ITEMS_TOTAL.clone()),
        // Transformer
        Box::new(TRANSFORM_CALLS_TOTAL.clone()),
        Box::new(TRANSFORM_DURATION_SECONDS.clone()),
        // Archive
        Box::new(ARCHIVE_BYTES_TOTAL.clone()),
    ]
}
