use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and register metric descriptions
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    init_metric_descriptions();

    Ok(handle)
}

/// Can be called multiple times safely
fn init_metric_descriptions() {
    describe_counter!(
        "tracking_batch_requests_total",
        "Batch log requests by outcome"
    );
    describe_counter!(
        "tracking_entities_logged_total",
        "Metrics, params and tags persisted through batch logging"
    );
    describe_histogram!(
        "tracking_batch_duration_seconds",
        "Batch log duration in seconds, validation included"
    );
    describe_gauge!("tracking_server_info", "Tracking server version");

    gauge!("tracking_server_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record the outcome of one batch log call
pub fn record_batch(outcome: &'static str, duration: Duration) {
    counter!("tracking_batch_requests_total", "outcome" => outcome).increment(1);
    histogram!("tracking_batch_duration_seconds").record(duration.as_secs_f64());
}

/// Record persisted entities of one kind (`metric`, `param`, `tag`)
pub fn record_entities(kind: &'static str, count: usize) {
    if count > 0 {
        counter!("tracking_entities_logged_total", "kind" => kind).increment(count as u64);
    }
}
