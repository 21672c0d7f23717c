//! Serving metrics and periodic summaries for the prediction service.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept for percentile estimates
const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector for the prediction endpoint
pub struct ServingMetrics {
    /// Predictions that returned a label
    pub predictions_served: AtomicU64,
    /// Requests that ended in an error
    pub predictions_failed: AtomicU64,
    /// Served predictions per species label
    by_label: RwLock<HashMap<String, u64>>,
    /// Failures per error kind
    by_error: RwLock<HashMap<String, u64>>,
    /// Request latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServingMetrics {
    pub fn new() -> Self {
        Self {
            predictions_served: AtomicU64::new(0),
            predictions_failed: AtomicU64::new(0),
            by_label: RwLock::new(HashMap::new()),
            by_error: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a served prediction
    pub fn record_prediction(&self, latency: Duration, label: &str) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);

        if let Ok(mut by_label) = self.by_label.write() {
            *by_label.entry(label.to_string()).or_insert(0) += 1;
        }
    }

    /// Record a failed request
    pub fn record_failure(&self, latency: Duration, kind: &str) {
        self.predictions_failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);

        if let Ok(mut by_error) = self.by_error.write() {
            *by_error.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    fn record_latency(&self, latency: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            // Drop the oldest half once the window is full
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    /// Latency percentiles over the current window
    pub fn get_latency_stats(&self) -> LatencyStats {
        let times = self.latencies.read().unwrap_or_else(|e| e.into_inner());
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Requests per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let total = self.predictions_served.load(Ordering::Relaxed)
            + self.predictions_failed.load(Ordering::Relaxed);
        if elapsed > 0.0 {
            total as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_predictions_by_label(&self) -> HashMap<String, u64> {
        self.by_label
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn get_failures_by_kind(&self) -> HashMap<String, u64> {
        self.by_error
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Point-in-time view for the metrics endpoint
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            predictions_served: self.predictions_served.load(Ordering::Relaxed),
            predictions_failed: self.predictions_failed.load(Ordering::Relaxed),
            predictions_by_label: self.get_predictions_by_label(),
            failures_by_kind: self.get_failures_by_kind(),
            latency: self.get_latency_stats(),
            throughput_rps: self.get_throughput(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let total = snapshot.predictions_served + snapshot.predictions_failed;
        let failure_rate = if total > 0 {
            (snapshot.predictions_failed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        info!(
            served = snapshot.predictions_served,
            failed = snapshot.predictions_failed,
            failure_rate = format!("{:.1}%", failure_rate),
            throughput = format!("{:.1} req/s", snapshot.throughput_rps),
            mean_us = snapshot.latency.mean_us,
            p50_us = snapshot.latency.p50_us,
            p95_us = snapshot.latency.p95_us,
            p99_us = snapshot.latency.p99_us,
            "Serving metrics summary"
        );
        for (label, count) in &snapshot.predictions_by_label {
            let pct = if snapshot.predictions_served > 0 {
                (*count as f64 / snapshot.predictions_served as f64) * 100.0
            } else {
                0.0
            };
            info!(species = %label, count = count, share = format!("{:.1}%", pct), "Predictions by species");
        }
        for (kind, count) in &snapshot.failures_by_kind {
            info!(kind = %kind, count = count, "Failures by kind");
        }
    }
}

impl Default for ServingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics in microseconds
#[derive(Debug, Default, Clone, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Body of the metrics endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub predictions_served: u64,
    pub predictions_failed: u64,
    pub predictions_by_label: HashMap<String, u64>,
    pub failures_by_kind: HashMap<String, u64>,
    pub latency: LatencyStats,
    pub throughput_rps: f64,
    pub uptime_secs: u64,
}

/// Periodic summary logger
pub struct MetricsReporter {
    metrics: Arc<ServingMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServingMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = ServingMetrics::new();

        metrics.record_prediction(Duration::from_micros(100), "Adelie");
        metrics.record_prediction(Duration::from_micros(200), "Gentoo");
        metrics.record_prediction(Duration::from_micros(300), "Adelie");
        metrics.record_failure(Duration::from_micros(50), "validation_error");

        assert_eq!(metrics.predictions_served.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.predictions_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.get_predictions_by_label().get("Adelie"), Some(&2));
        assert_eq!(
            metrics.get_failures_by_kind().get("validation_error"),
            Some(&1)
        );
    }

    #[test]
    fn test_latency_stats() {
        let metrics = ServingMetrics::new();
        for us in 1..=100 {
            metrics.record_prediction(Duration::from_micros(us), "Adelie");
        }

        let stats = metrics.get_latency_stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.max_us, 100);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.p99_us, 100);
    }

    #[test]
    fn test_empty_stats() {
        let stats = ServingMetrics::new().get_latency_stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.p99_us, 0);
    }

    #[test]
    fn test_latency_window_bounded() {
        let metrics = ServingMetrics::new();
        for _ in 0..(LATENCY_WINDOW + 1) {
            metrics.record_prediction(Duration::from_micros(10), "Dream");
        }

        assert!(metrics.get_latency_stats().count <= LATENCY_WINDOW as u64);
    }
}
