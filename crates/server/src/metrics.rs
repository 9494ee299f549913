//! Prometheus metrics for the stitch server.
//!
//! The `/metrics` endpoint is unauthenticated. Metrics carry no session ids
//! or filenames, only aggregate counts, but the endpoint should still be
//! network-restricted to the scraper.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Chunk metrics
pub static CHUNKS_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("stitch_chunks_uploaded_total", "Total number of chunks stored")
        .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("stitch_bytes_uploaded_total", "Total chunk bytes stored")
        .expect("metric creation failed")
});

pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("stitch_upload_errors_total", "Total chunk upload failures by kind"),
        &["kind"],
    )
    .expect("metric creation failed")
});

// Merge metrics
pub static MERGES_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("stitch_merges_completed_total", "Total number of committed merges")
        .expect("metric creation failed")
});

pub static MERGED_BYTES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("stitch_merged_bytes_total", "Total bytes written to merged artifacts")
        .expect("metric creation failed")
});

pub static MERGE_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("stitch_merge_failures_total", "Total failed merges by kind"),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static MERGE_CLEANUP_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_merge_cleanup_failures_total",
        "Total chunks left behind after a committed merge",
    )
    .expect("metric creation failed")
});

// Timing metrics
pub static CHUNK_UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "stitch_chunk_upload_duration_seconds",
            "Time taken to store a single chunk",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .expect("metric creation failed")
});

pub static MERGE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("stitch_merge_duration_seconds", "Time taken to merge a session")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: [Box<dyn prometheus::core::Collector>; 9] = [
            Box::new(CHUNKS_UPLOADED.clone()),
            Box::new(BYTES_UPLOADED.clone()),
            Box::new(UPLOAD_ERRORS.clone()),
            Box::new(MERGES_COMPLETED.clone()),
            Box::new(MERGED_BYTES.clone()),
            Box::new(MERGE_FAILURES.clone()),
            Box::new(MERGE_CLEANUP_FAILURES.clone()),
            Box::new(CHUNK_UPLOAD_DURATION.clone()),
            Box::new(MERGE_DURATION.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a failed chunk upload.
pub fn record_upload_error(kind: &str) {
    UPLOAD_ERRORS.with_label_values(&[kind]).inc();
}

/// Record a failed merge.
pub fn record_merge_failure(kind: &str) {
    MERGE_FAILURES.with_label_values(&[kind]).inc();
}
