//! Bridge metrics for monitoring and observability.
//!
//! This module provides the collector that aggregates per-request outcomes
//! and synthesis timings, plus the statistics snapshot returned by
//! [`SynthesisBridge::stats`](crate::SynthesisBridge::stats).

use crate::engine::worker::WorkerState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Snapshot of bridge statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStats {
    /// Requests submitted
    pub total_requests: u64,

    /// Requests answered with an output file
    pub outputs: u64,

    /// Requests answered without an output file
    pub empty_outputs: u64,

    /// Requests rejected because no worker could service them
    pub unavailable: u64,

    /// Requests awaiting a reply
    pub in_flight: usize,

    /// Average round trip in microseconds
    pub avg_round_trip_us: f64,

    /// State of each worker, by index
    pub worker_states: Vec<WorkerState>,
}

/// Metrics collector for aggregating bridge metrics
pub struct BridgeMetrics {
    total_requests: AtomicU64,
    outputs: AtomicU64,
    empty_outputs: AtomicU64,
    unavailable: AtomicU64,
    completed: AtomicU64,
    total_round_trip_us: AtomicU64,
    error_counts: parking_lot::Mutex<HashMap<String, u64>>,
}

impl BridgeMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            outputs: AtomicU64::new(0),
            empty_outputs: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            total_round_trip_us: AtomicU64::new(0),
            error_counts: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Record a submitted request
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed synthesis round trip
    pub fn record_output(&self, has_output: bool, round_trip: Duration) {
        if has_output {
            self.outputs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.empty_outputs.fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.total_round_trip_us
            .fetch_add(round_trip.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a request no worker could service
    pub fn record_unavailable(&self) {
        self.unavailable.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error
    pub fn record_error(&self, error_code: &str) {
        let mut counts = self.error_counts.lock();
        *counts.entry(error_code.to_string()).or_insert(0) += 1;
    }

    /// Get total requests
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Get requests answered with output
    pub fn outputs(&self) -> u64 {
        self.outputs.load(Ordering::Relaxed)
    }

    /// Get requests answered without output
    pub fn empty_outputs(&self) -> u64 {
        self.empty_outputs.load(Ordering::Relaxed)
    }

    /// Get requests rejected as unavailable
    pub fn unavailable(&self) -> u64 {
        self.unavailable.load(Ordering::Relaxed)
    }

    /// Get average round trip in microseconds
    pub fn avg_round_trip_us(&self) -> f64 {
        let completed = self.completed.load(Ordering::Relaxed);
        if completed == 0 {
            0.0
        } else {
            self.total_round_trip_us.load(Ordering::Relaxed) as f64 / completed as f64
        }
    }

    /// Get error counts
    pub fn error_counts(&self) -> HashMap<String, u64> {
        self.error_counts.lock().clone()
    }

    /// Export Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP churchroad_requests_total Synthesis requests submitted\n");
        output.push_str("# TYPE churchroad_requests_total counter\n");
        output.push_str(&format!(
            "churchroad_requests_total {}\n",
            self.total_requests()
        ));

        output.push_str("\n# HELP churchroad_responses_total Synthesis responses by outcome\n");
        output.push_str("# TYPE churchroad_responses_total counter\n");
        output.push_str(&format!(
            "churchroad_responses_total{{outcome=\"output\"}} {}\n",
            self.outputs()
        ));
        output.push_str(&format!(
            "churchroad_responses_total{{outcome=\"empty\"}} {}\n",
            self.empty_outputs()
        ));
        output.push_str(&format!(
            "churchroad_responses_total{{outcome=\"unavailable\"}} {}\n",
            self.unavailable()
        ));

        output.push_str("\n# HELP churchroad_round_trip_us Average request round trip\n");
        output.push_str("# TYPE churchroad_round_trip_us gauge\n");
        output.push_str(&format!(
            "churchroad_round_trip_us {:.2}\n",
            self.avg_round_trip_us()
        ));

        output.push_str("\n# HELP churchroad_errors_total Error counts by code\n");
        output.push_str("# TYPE churchroad_errors_total counter\n");
        for (code, count) in self.error_counts() {
            output.push_str(&format!(
                "churchroad_errors_total{{code=\"{}\"}} {}\n",
                code, count
            ));
        }

        output
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for measuring a request round trip
pub struct RoundTripTimer {
    start: Instant,
}

impl RoundTripTimer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector() {
        let metrics = BridgeMetrics::new();

        metrics.record_request();
        metrics.record_request();
        metrics.record_request();
        metrics.record_output(true, Duration::from_millis(10));
        metrics.record_output(false, Duration::from_millis(30));
        metrics.record_unavailable();

        assert_eq!(metrics.total_requests(), 3);
        assert_eq!(metrics.outputs(), 1);
        assert_eq!(metrics.empty_outputs(), 1);
        assert_eq!(metrics.unavailable(), 1);
        assert!((metrics.avg_round_trip_us() - 20_000.0).abs() < 1.0);
    }

    #[test]
    fn test_avg_without_requests() {
        let metrics = BridgeMetrics::new();
        assert_eq!(metrics.avg_round_trip_us(), 0.0);
    }

    #[test]
    fn test_error_counts() {
        let metrics = BridgeMetrics::new();
        metrics.record_error("WORKER_UNAVAILABLE");
        metrics.record_error("WORKER_UNAVAILABLE");
        metrics.record_error("SHUTDOWN");

        let counts = metrics.error_counts();
        assert_eq!(counts["WORKER_UNAVAILABLE"], 2);
        assert_eq!(counts["SHUTDOWN"], 1);
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = BridgeMetrics::new();
        metrics.record_request();
        metrics.record_output(true, Duration::from_micros(5));
        metrics.record_error("SHUTDOWN");

        let output = metrics.to_prometheus();
        assert!(output.contains("churchroad_requests_total 1"));
        assert!(output.contains("churchroad_responses_total{outcome=\"output\"} 1"));
        assert!(output.contains("churchroad_errors_total{code=\"SHUTDOWN\"} 1"));
    }

    #[test]
    fn test_round_trip_timer() {
        let timer = RoundTripTimer::start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.elapsed() >= Duration::from_millis(5));
    }
}
