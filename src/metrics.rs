//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{Counter, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "dreamtoon_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // AI provider Metrics
    pub static ref AI_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dreamtoon_ai_requests_total", "Total number of AI provider calls"),
        &["operation", "status"]
    ).expect("metric can be created");
    pub static ref AI_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "dreamtoon_ai_request_duration_seconds",
            "AI provider call duration in seconds"
        ).buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 60.0, 120.0]),
        &["operation"]
    ).expect("metric can be created");

    // Generation Metrics
    pub static ref PANELS_GENERATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dreamtoon_panels_generated_total", "Total number of comic panels attempted"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref COMIC_JOBS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dreamtoon_comic_jobs_total", "Total number of comic generations by outcome"),
        &["mode", "outcome"]
    ).expect("metric can be created");

    // Webhook Metrics
    pub static ref WEBHOOK_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dreamtoon_webhook_events_total", "Total number of subscription webhook events"),
        &["event_type"]
    ).expect("metric can be created");

    // Storage Metrics
    pub static ref STORAGE_UPLOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dreamtoon_storage_uploads_total", "Total number of blob uploads"),
        &["bucket"]
    ).expect("metric can be created");
    pub static ref STORAGE_BYTES_UPLOADED: Counter = Counter::new(
        "dreamtoon_storage_bytes_uploaded_total",
        "Total bytes uploaded to blob storage"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("dreamtoon_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Record one AI provider call.
pub fn observe_ai_call(operation: &str, status: &str, elapsed: Duration) {
    AI_REQUESTS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
    AI_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(elapsed.as_secs_f64());
}

/// Initialize metrics registry.
///
/// Safe to call more than once; repeated registrations are ignored.
pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(AI_REQUESTS_TOTAL.clone()),
        Box::new(AI_REQUEST_DURATION_SECONDS.clone()),
        Box::new(PANELS_GENERATED_TOTAL.clone()),
        Box::new(COMIC_JOBS_TOTAL.clone()),
        Box::new(WEBHOOK_EVENTS_TOTAL.clone()),
        Box::new(STORAGE_UPLOADS_TOTAL.clone()),
        Box::new(STORAGE_BYTES_UPLOADED.clone()),
        Box::new(ERRORS_TOTAL.clone()),
    ];

    for collector in collectors {
        if let Err(error) = REGISTRY.register(collector) {
            tracing::debug!(%error, "Metric already registered");
        }
    }

    tracing::info!("Metrics registry initialized");
}
