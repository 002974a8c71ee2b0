//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the timelapse server:
//! - HTTP request metrics (latency, counts)
//! - WebSocket connection metrics
//! - Generation and worker control requests
//! - Pipeline metrics registered from the core crate

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "timelapse_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("timelapse_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "timelapse_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "timelapse_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "timelapse_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by event type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("timelapse_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// WebSocket lag events (when client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "timelapse_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Control Metrics
// =============================================================================

/// Generation start/stop requests by action and outcome.
pub static GENERATION_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "timelapse_generation_requests_total",
            "Generation start/stop requests",
        ),
        &["action", "outcome"], // action: "start", "stop"; outcome: "accepted", "rejected"
    )
    .unwrap()
});

/// Workers requested per stage, by action and outcome.
pub static WORKER_CHANGES_REQUESTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "timelapse_worker_changes_requested_total",
            "Workers requested to be added or removed",
        ),
        &["stage", "action", "outcome"],
    )
    .unwrap()
});

/// Label for a control request result.
pub fn outcome<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "accepted"
    } else {
        "rejected"
    }
}

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Control
    registry
        .register(Box::new(GENERATION_REQUESTS.clone()))
        .unwrap();
    registry
        .register(Box::new(WORKER_CHANGES_REQUESTED.clone()))
        .unwrap();

    // Core metrics (stages, pools, ingest)
    for metric in timelapse_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use timelapse_core::metrics::{GENERATION_RUNNING, WORKERS};

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/api/v1/health", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("timelapse_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        WS_CONNECTIONS_TOTAL.inc();
        GENERATION_RUNNING.get();
        WORKERS.with_label_values(&["render"]).set(0);

        let output = encode_metrics();
        assert!(output.contains("timelapse_ws_connections_total"));
        assert!(output.contains("timelapse_generation_running"));
        assert!(output.contains("timelapse_workers"));
    }

    #[test]
    fn test_control_metrics_are_labelled_by_stage() {
        WORKER_CHANGES_REQUESTED
            .with_label_values(&["render", "add", outcome::<(), ()>(&Ok(()))])
            .inc_by(3);
        GENERATION_REQUESTS
            .with_label_values(&["stop", outcome::<(), ()>(&Err(()))])
            .inc();

        let output = encode_metrics();
        let worker_line = output
            .lines()
            .find(|l| l.starts_with("timelapse_worker_changes_requested_total{"))
            .unwrap();
        assert!(worker_line.contains(r#"stage="render""#));
        assert!(worker_line.contains(r#"outcome="accepted""#));
        assert!(output.contains(r#"outcome="rejected""#));
    }
}
