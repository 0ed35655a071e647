use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Session store metrics (memory / Redis)
    pub static ref STORE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "session_store_operations_total",
        "Total number of session store operations",
        &["backend", "operation", "status"]
    )
    .unwrap();

    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "session_store_operation_duration_seconds",
        "Session store operation duration in seconds",
        &["backend", "operation"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1]
    )
    .unwrap();

    // Business Metrics
    pub static ref SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "adaptive_sessions_total",
        "Total number of adaptive test sessions",
        &["status"]
    )
    .unwrap();

    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "adaptive_sessions_active",
        "Number of started, unfinished adaptive test sessions"
    )
    .unwrap();

    pub static ref ANSWERS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_submitted_total",
        "Total number of answers submitted",
        &["tier", "correct"]
    )
    .unwrap();

    pub static ref TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "progression_transitions_total",
        "Progression state machine transitions",
        &["transition"]
    )
    .unwrap();

    pub static ref AI_SUPPORT_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ai_support_requests_total",
        "AI support content requests by source",
        &["source"]
    )
    .unwrap();

    pub static ref RESULTS_ARCHIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "results_archived_total",
        "Completed session summaries written to MongoDB",
        &["status"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a session store operation with metrics
pub async fn track_store_operation<F, T, E>(
    backend: &str,
    operation: &str,
    future: F,
) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    STORE_OPERATIONS_TOTAL
        .with_label_values(&[backend, operation, status])
        .inc();

    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[backend, operation])
        .observe(duration);

    result
}
