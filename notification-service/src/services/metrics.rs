//! Metrics collection for notification-service.
//!
//! The `metrics` recorder carries the HTTP middleware series; the
//! notification counters live in a dedicated Prometheus registry.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static NOTIFICATION_SENT_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static NOTIFICATION_PROVIDER_CALLS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize metrics collection. Fails if called twice.
pub fn init_metrics() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("metrics handle already initialized"))?;

    let registry = Registry::new();

    let notifications_counter = IntCounterVec::new(
        Opts::new(
            "notification_sent_total",
            "Registration notifications by outcome (sent, failed, rejected)",
        ),
        &["status"],
    )?;

    let provider_calls_counter = IntCounterVec::new(
        Opts::new(
            "notification_provider_calls_total",
            "Email provider calls by provider and status",
        ),
        &["provider", "status"],
    )?;

    registry.register(Box::new(notifications_counter.clone()))?;
    registry.register(Box::new(provider_calls_counter.clone()))?;

    PROMETHEUS_REGISTRY
        .set(registry)
        .map_err(|_| anyhow::anyhow!("prometheus registry already initialized"))?;
    NOTIFICATION_SENT_TOTAL
        .set(notifications_counter)
        .map_err(|_| anyhow::anyhow!("notification_sent_total already initialized"))?;
    NOTIFICATION_PROVIDER_CALLS_TOTAL
        .set(provider_calls_counter)
        .map_err(|_| anyhow::anyhow!("notification_provider_calls_total already initialized"))?;

    Ok(())
}

/// Get metrics output in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Record the outcome of one `/notify` request.
pub fn record_notification(status: &str) {
    if let Some(counter) = NOTIFICATION_SENT_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}

/// Record an email provider call.
pub fn record_provider_call(provider: &str, status: &str) {
    if let Some(counter) = NOTIFICATION_PROVIDER_CALLS_TOTAL.get() {
        counter.with_label_values(&[provider, status]).inc();
    }
}
