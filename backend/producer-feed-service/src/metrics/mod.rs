//! Prometheus metrics for producer-feed-service.
//!
//! HTTP collectors are fed by the `wrap_fn` in `main`; feed collectors by the engine stages.

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::time::Duration;

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "producer_feed_http_requests_total",
        "Total HTTP requests",
        &["method", "path", "status"]
    )
    .expect("failed to register producer_feed_http_requests_total")
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "producer_feed_http_request_duration_seconds",
        "HTTP request latency",
        &["method", "path"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("failed to register producer_feed_http_request_duration_seconds")
});

/// Feed requests by mode and outcome (ok, empty, not_found, timeout, error)
static FEED_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "producer_feed_requests_total",
        "Feed requests segmented by mode and outcome",
        &["mode", "outcome"]
    )
    .expect("failed to register producer_feed_requests_total")
});

static FEED_STAGE_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "producer_feed_stage_duration_seconds",
        "Duration of each feed pipeline stage",
        &["stage"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("failed to register producer_feed_stage_duration_seconds")
});

static FEED_DEGRADED_SIGNALS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "producer_feed_degraded_signals_total",
        "Requester signals that failed and were replaced by neutral values",
        &["signal"]
    )
    .expect("failed to register producer_feed_degraded_signals_total")
});

static FEED_TOTAL_COUNT_SOURCE: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "producer_feed_total_count_source_total",
        "Which path produced the page total (count, candidate_ids, approximate)",
        &["source"]
    )
    .expect("failed to register producer_feed_total_count_source_total")
});

static FEED_ENRICHMENT_PLACEHOLDERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "producer_feed_enrichment_placeholders_total",
        "Items rendered with placeholder author metadata",
        &["reason"]
    )
    .expect("failed to register producer_feed_enrichment_placeholders_total")
});

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub fn observe_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_feed_request(mode: &str, outcome: &str) {
    FEED_REQUESTS_TOTAL.with_label_values(&[mode, outcome]).inc();
}

pub fn observe_stage(stage: &str, duration: Duration) {
    FEED_STAGE_DURATION_SECONDS
        .with_label_values(&[stage])
        .observe(duration.as_secs_f64());
}

pub fn record_degraded_signal(signal: &str) {
    FEED_DEGRADED_SIGNALS_TOTAL.with_label_values(&[signal]).inc();
}

pub fn record_total_source(source: &str) {
    FEED_TOTAL_COUNT_SOURCE.with_label_values(&[source]).inc();
}

pub fn record_enrichment_placeholder(reason: &str, count: usize) {
    FEED_ENRICHMENT_PLACEHOLDERS_TOTAL
        .with_label_values(&[reason])
        .inc_by(count as u64);
}
