//! Relay metrics.
//!
//! Plain atomic counters, exported as JSON on `/metrics` and, with the
//! `metrics` feature, in Prometheus text format on `/metrics/prometheus`.

use axum::http::StatusCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Session relay metrics
#[derive(Default)]
pub struct RelayMetrics {
    // Request counters
    pub requests_total: AtomicU64,

    // Backend answers, by status class
    pub responses_2xx: AtomicU64,
    pub responses_3xx: AtomicU64,
    pub responses_4xx: AtomicU64,
    pub responses_5xx: AtomicU64,

    // Failures handled at the proxy layer
    pub backend_failures: AtomicU64,
    pub rejected_bodies: AtomicU64,

    // CSRF lifecycle
    pub csrf_fetches: AtomicU64,
    pub csrf_fetch_failures: AtomicU64,

    // Latency tracking (simplified - in production use histograms)
    pub total_latency_ms: AtomicU64,
    pub request_count_for_latency: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a backend response relayed to the browser
    pub fn record_response(&self, status: StatusCode, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let counter = match status.as_u16() {
            200..=299 => Some(&self.responses_2xx),
            300..=399 => Some(&self.responses_3xx),
            400..=499 => Some(&self.responses_4xx),
            500..=599 => Some(&self.responses_5xx),
            _ => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        self.record_latency(latency_ms);
    }

    /// Record a backend that could not be reached
    pub fn record_backend_failure(&self, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.backend_failures.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency_ms);
    }

    /// Record an inbound body refused before reaching the backend
    pub fn record_rejected_body(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.rejected_bodies.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an anti-forgery token fetch
    pub fn record_csrf_fetch(&self, success: bool) {
        self.csrf_fetches.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.csrf_fetch_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_latency(&self, latency_ms: u64) {
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.request_count_for_latency.fetch_add(1, Ordering::Relaxed);
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.request_count_for_latency.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Export metrics in Prometheus text format.
    ///
    /// Each call snapshots the counters into a fresh registry, so several
    /// relays in one process never collide on metric names.
    #[cfg(feature = "metrics")]
    pub fn to_prometheus(&self) -> Result<String, prometheus::Error> {
        use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

        let registry = Registry::new();

        let counter = |name: &str, help: &str, value: &AtomicU64| -> Result<(), prometheus::Error> {
            let metric = IntCounter::new(name, help)?;
            metric.inc_by(value.load(Ordering::Relaxed));
            registry.register(Box::new(metric))
        };
        counter(
            "session_relay_requests_total",
            "Total number of relayed requests",
            &self.requests_total,
        )?;
        counter(
            "session_relay_backend_failures_total",
            "Requests redirected to the error page",
            &self.backend_failures,
        )?;
        counter(
            "session_relay_rejected_bodies_total",
            "Inbound bodies refused before reaching the backend",
            &self.rejected_bodies,
        )?;
        counter(
            "session_relay_csrf_fetches_total",
            "Anti-forgery token fetches",
            &self.csrf_fetches,
        )?;
        counter(
            "session_relay_csrf_fetch_failures_total",
            "Failed anti-forgery fetches",
            &self.csrf_fetch_failures,
        )?;

        let responses = IntCounterVec::new(
            Opts::new(
                "session_relay_responses_total",
                "Backend responses by status class",
            ),
            &["class"],
        )?;
        for (class, value) in [
            ("2xx", &self.responses_2xx),
            ("3xx", &self.responses_3xx),
            ("4xx", &self.responses_4xx),
            ("5xx", &self.responses_5xx),
        ] {
            responses
                .with_label_values(&[class])
                .inc_by(value.load(Ordering::Relaxed));
        }
        registry.register(Box::new(responses))?;

        let latency = Gauge::new(
            "session_relay_average_latency_ms",
            "Average relay latency",
        )?;
        latency.set(self.average_latency_ms());
        registry.register(Box::new(latency))?;

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "requests": {
                "total": self.requests_total.load(Ordering::Relaxed),
                "backend_failures": self.backend_failures.load(Ordering::Relaxed),
                "rejected_bodies": self.rejected_bodies.load(Ordering::Relaxed),
            },
            "responses": {
                "2xx": self.responses_2xx.load(Ordering::Relaxed),
                "3xx": self.responses_3xx.load(Ordering::Relaxed),
                "4xx": self.responses_4xx.load(Ordering::Relaxed),
                "5xx": self.responses_5xx.load(Ordering::Relaxed),
            },
            "csrf": {
                "fetches": self.csrf_fetches.load(Ordering::Relaxed),
                "failures": self.csrf_fetch_failures.load(Ordering::Relaxed),
            },
            "latency": {
                "average_ms": self.average_latency_ms(),
            }
        })
    }
}

/// Request timing helper
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<RelayMetrics>,
}

impl RequestTimer {
    pub fn new(metrics: Arc<RelayMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Finish with the status the backend answered
    pub fn finish(self, status: StatusCode) {
        let latency_ms = self.elapsed_ms();
        self.metrics.record_response(status, latency_ms);
    }

    /// Finish with an unreachable backend
    pub fn fail(self) {
        let latency_ms = self.elapsed_ms();
        self.metrics.record_backend_failure(latency_ms);
    }
}
