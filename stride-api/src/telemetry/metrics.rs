//! Prometheus Metrics Definitions
//!
//! Defines all STRIDE metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use stride_core::{QuizType, SourceKind};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<StrideMetrics>> = Lazy::new(StrideMetrics::new);

/// The registered metrics, or `None` if registration failed.
pub fn metrics() -> Option<&'static StrideMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all STRIDE metrics.
#[derive(Clone)]
pub struct StrideMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Check-in attempts - labels: outcome
    pub check_ins_total: CounterVec,

    /// Scored quiz submissions - labels: quiz_type, passed
    pub quiz_submissions_total: CounterVec,

    /// Skill points written to the ledger - labels: source_kind
    pub skill_points_awarded_total: CounterVec,
}

impl StrideMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "stride_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "stride_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            check_ins_total: register_counter_vec!(
                "stride_check_ins_total",
                "Activity check-in attempts by outcome",
                &["outcome"]
            )
            .map_err(|e| registration_error("check_ins_total", e))?,

            quiz_submissions_total: register_counter_vec!(
                "stride_quiz_submissions_total",
                "Scored module quiz submissions",
                &["quiz_type", "passed"]
            )
            .map_err(|e| registration_error("quiz_submissions_total", e))?,

            skill_points_awarded_total: register_counter_vec!(
                "stride_skill_points_awarded_total",
                "Skill points written to the ledger",
                &["source_kind"]
            )
            .map_err(|e| registration_error("skill_points_awarded_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a check-in attempt. `outcome` is `checked_in` or an error kind.
    pub fn record_check_in(&self, outcome: &str) {
        self.check_ins_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_quiz_submission(&self, quiz_type: QuizType, passed: bool) {
        let passed = if passed { "true" } else { "false" };
        self.quiz_submissions_total
            .with_label_values(&[quiz_type.as_db_str(), passed])
            .inc();
    }

    pub fn record_points_awarded(&self, source_kind: SourceKind, points: i64) {
        if points > 0 {
            self.skill_points_awarded_total
                .with_label_values(&[source_kind.as_db_str()])
                .inc_by(points as f64);
        }
    }
}

fn registration_error(name: &str, err: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, err))
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[cfg_attr(
    feature = "openapi",
    utoipa::path(
        get,
        path = "/metrics",
        tag = "Observability",
        responses(
            (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
            (status = 500, description = "Failed to encode metrics"),
        ),
    )
)]
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
