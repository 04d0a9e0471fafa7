// Self-telemetry module
// This file registers the prometheus series describing the publisher's own
// health: flush latency, published data points and sink failures
//
// Numan Thabit 2025 Nov

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec,
};

pub static PUBLISH_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "svc_metrics_publish_latency_seconds",
        "latency of one flush to the metrics sink",
        &["sink"]
    )
    .unwrap()
});

pub static PUBLISH_DATAPOINTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "svc_metrics_published_datapoints_total",
        "data points accepted by the metrics sink",
        &["sink"]
    )
    .unwrap()
});

pub static PUBLISH_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "svc_metrics_publish_errors_total",
        "failed flushes by sink",
        &["sink"]
    )
    .unwrap()
});
