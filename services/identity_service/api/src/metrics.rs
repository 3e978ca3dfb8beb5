//! `GET /metrics` (§6): Prometheus text exposition. Grounded on
//! `examples/NorvetMSP-peanut-pos/services/auth-service/src/metrics.rs`
//! (registry-owning struct, `IntCounterVec` per labeled family, `render()`
//! returning a ready-made `text/plain; version=0.0.4` response) — the
//! teacher repo has no metrics module of its own, so this is pulled in
//! from the wider example pack rather than invented from scratch.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct ApiMetrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    lifecycle_events_total: IntCounterVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total =
            IntCounterVec::new(Opts::new("http_requests_total", "HTTP requests by method and status class"), &["method", "status"])?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("http_request_duration_seconds", "HTTP request latency in seconds"),
            &["method"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        let lifecycle_events_total =
            IntCounterVec::new(Opts::new("identity_events_total", "Lifecycle events published via the event bus"), &["event_type"])?;
        registry.register(Box::new(lifecycle_events_total.clone()))?;

        Ok(Self { registry, http_requests_total, http_request_duration_seconds, lifecycle_events_total })
    }

    pub fn record_request(&self, method: &str, status: u16, duration_secs: f64) {
        let class = format!("{}xx", status / 100);
        self.http_requests_total.with_label_values(&[method, &class]).inc();
        self.http_request_duration_seconds.with_label_values(&[method]).observe(duration_secs);
    }

    pub fn record_event(&self, event_type: &str) {
        self.lifecycle_events_total.with_label_values(&[event_type]).inc();
    }

    pub fn render(&self) -> Result<Response, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"))
            .body(Body::from(buffer))
            .expect("static metrics response is always well-formed"))
    }
}
