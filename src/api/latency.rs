//! In-memory request latency histogram behind `/stats/latency`.
//! Fed by the `track_latency` middleware for every request the router serves.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;

use crate::api::routes::ApiState;

/// Shared latency stats. Middleware records, API reads.
/// Values stored in microseconds.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySnapshot {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

impl LatencyStats {
    /// Tracks 1us to 100s at 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 100_000_000, 3)
            .expect("valid histogram bounds");
        Self { inner: Mutex::new(histogram) }
    }

    pub fn record_us(&self, us: u64) {
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us.max(1));
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().min(u128::from(u64::MAX)) as u64;
        self.record_us(us);
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let Ok(h) = self.inner.lock() else {
            return LatencySnapshot { samples: 0, p50_ms: None, p95_ms: None, p99_ms: None };
        };
        if h.len() == 0 {
            return LatencySnapshot { samples: 0, p50_ms: None, p95_ms: None, p99_ms: None };
        }
        let ms = |q: f64| Some(h.value_at_quantile(q) as f64 / 1_000.0);
        LatencySnapshot { samples: h.len(), p50_ms: ms(0.5), p95_ms: ms(0.95), p99_ms: ms(0.99) }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Times each request end to end, including extractor rejections.
pub async fn track_latency(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    state.latency.record(started.elapsed());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let stats = LatencyStats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.samples, 0);
        assert_eq!(snap.p50_ms, None);
    }

    #[test]
    fn percentiles_are_reported_in_millis() {
        let stats = LatencyStats::new();
        for _ in 0..99 {
            stats.record(Duration::from_millis(2));
        }
        stats.record(Duration::from_millis(500));

        let snap = stats.snapshot();
        assert_eq!(snap.samples, 100);
        let p50 = snap.p50_ms.unwrap();
        assert!((1.9..2.1).contains(&p50), "p50 was {p50}");
        assert!(snap.p99_ms.unwrap() <= 2.1);
    }
}
