use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::utils::time::periodic;

/// Metrics collector for the booking-order monitor
#[derive(Debug)]
pub struct MonitorMetrics {
    // Latency tracking
    tick_latency: LatencyTracker,
    sweep_latency: LatencyTracker,
    execution_latency: LatencyTracker,

    // Throughput counters
    ticks_processed: AtomicU64,
    evaluations: AtomicU64,
    orders_added: AtomicU64,
    orders_removed: AtomicU64,
    executions_succeeded: AtomicU64,
    executions_failed: AtomicU64,
    orders_expired: AtomicU64,

    // Working set
    pending_orders: AtomicU64,
    tracked_instruments: AtomicU64,
}

impl MonitorMetrics {
    pub fn new() -> Self {
        describe_counter!("monitor_ticks_total", "Price ticks handled by the engine");
        describe_counter!("monitor_evaluations_total", "Full order evaluations");
        describe_counter!("monitor_orders_total", "Orders entering or leaving working memory");
        describe_counter!("monitor_executions_total", "Order executions by outcome");
        describe_histogram!(
            "monitor_operation_duration_seconds",
            "Duration of engine operations"
        );
        describe_gauge!("monitor_pending_orders", "Orders currently held in working memory");
        describe_gauge!(
            "monitor_tracked_instruments",
            "Instruments with a live price subscription"
        );

        Self {
            tick_latency: LatencyTracker::new("tick"),
            sweep_latency: LatencyTracker::new("sweep"),
            execution_latency: LatencyTracker::new("execution"),
            ticks_processed: AtomicU64::new(0),
            evaluations: AtomicU64::new(0),
            orders_added: AtomicU64::new(0),
            orders_removed: AtomicU64::new(0),
            executions_succeeded: AtomicU64::new(0),
            executions_failed: AtomicU64::new(0),
            orders_expired: AtomicU64::new(0),
            pending_orders: AtomicU64::new(0),
            tracked_instruments: AtomicU64::new(0),
        }
    }

    // Latency recording; the engine's operations are async so callers time them
    // with a LatencyTimer and hand over the elapsed duration.
    pub fn record_tick_latency(&self, duration: Duration) {
        self.tick_latency.record_latency(duration);
    }

    pub fn record_sweep_latency(&self, duration: Duration) {
        self.sweep_latency.record_latency(duration);
    }

    pub fn record_execution_latency(&self, duration: Duration) {
        self.execution_latency.record_latency(duration);
    }

    // Counter methods
    pub fn increment_ticks_processed(&self) {
        self.ticks_processed.fetch_add(1, Ordering::Relaxed);
        counter!("monitor_ticks_total").increment(1);
    }

    pub fn increment_evaluations(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        counter!("monitor_evaluations_total").increment(1);
    }

    pub fn increment_orders_added(&self) {
        self.orders_added.fetch_add(1, Ordering::Relaxed);
        counter!("monitor_orders_total", "operation" => "add").increment(1);
    }

    pub fn increment_orders_removed(&self) {
        self.orders_removed.fetch_add(1, Ordering::Relaxed);
        counter!("monitor_orders_total", "operation" => "remove").increment(1);
    }

    pub fn increment_executions_succeeded(&self) {
        self.executions_succeeded.fetch_add(1, Ordering::Relaxed);
        counter!("monitor_executions_total", "outcome" => "executed").increment(1);
    }

    pub fn increment_executions_failed(&self) {
        self.executions_failed.fetch_add(1, Ordering::Relaxed);
        counter!("monitor_executions_total", "outcome" => "failed").increment(1);
    }

    pub fn increment_orders_expired(&self) {
        self.orders_expired.fetch_add(1, Ordering::Relaxed);
        counter!("monitor_orders_total", "operation" => "expire").increment(1);
    }

    // Gauge methods
    pub fn set_pending_orders(&self, count: u64) {
        self.pending_orders.store(count, Ordering::Relaxed);
        gauge!("monitor_pending_orders").set(count as f64);
    }

    pub fn set_tracked_instruments(&self, count: u64) {
        self.tracked_instruments.store(count, Ordering::Relaxed);
        gauge!("monitor_tracked_instruments").set(count as f64);
    }

    // Getters for current values
    pub fn get_ticks_processed(&self) -> u64 {
        self.ticks_processed.load(Ordering::Relaxed)
    }

    pub fn get_evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn get_orders_added(&self) -> u64 {
        self.orders_added.load(Ordering::Relaxed)
    }

    pub fn get_orders_removed(&self) -> u64 {
        self.orders_removed.load(Ordering::Relaxed)
    }

    pub fn get_executions_succeeded(&self) -> u64 {
        self.executions_succeeded.load(Ordering::Relaxed)
    }

    pub fn get_executions_failed(&self) -> u64 {
        self.executions_failed.load(Ordering::Relaxed)
    }

    pub fn get_orders_expired(&self) -> u64 {
        self.orders_expired.load(Ordering::Relaxed)
    }

    pub fn get_pending_orders(&self) -> u64 {
        self.pending_orders.load(Ordering::Relaxed)
    }

    pub fn get_tracked_instruments(&self) -> u64 {
        self.tracked_instruments.load(Ordering::Relaxed)
    }

    pub fn get_latency_stats(&self) -> LatencyStats {
        LatencyStats {
            tick: self.tick_latency.get_stats(),
            sweep: self.sweep_latency.get_stats(),
            execution: self.execution_latency.get_stats(),
        }
    }
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency tracker for individual operations
#[derive(Debug)]
struct LatencyTracker {
    operation: &'static str,
    samples: AtomicU64,
    total_nanos: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl LatencyTracker {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            samples: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
            min_nanos: AtomicU64::new(u64::MAX),
            max_nanos: AtomicU64::new(0),
        }
    }

    fn record_latency(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;

        self.samples.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);

        // Update min (with CAS loop)
        let mut current_min = self.min_nanos.load(Ordering::Relaxed);
        while nanos < current_min {
            match self.min_nanos.compare_exchange_weak(
                current_min,
                nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(new_min) => current_min = new_min,
            }
        }

        // Update max (with CAS loop)
        let mut current_max = self.max_nanos.load(Ordering::Relaxed);
        while nanos > current_max {
            match self.max_nanos.compare_exchange_weak(
                current_max,
                nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(new_max) => current_max = new_max,
            }
        }

        histogram!("monitor_operation_duration_seconds", "operation" => self.operation)
            .record(duration.as_secs_f64());
    }

    fn get_stats(&self) -> OperationLatencyStats {
        let samples = self.samples.load(Ordering::Relaxed);
        let total = self.total_nanos.load(Ordering::Relaxed);
        let min = self.min_nanos.load(Ordering::Relaxed);
        let max = self.max_nanos.load(Ordering::Relaxed);

        let avg = if samples > 0 { total / samples } else { 0 };

        OperationLatencyStats {
            operation: self.operation.to_string(),
            samples,
            avg_nanos: avg,
            min_nanos: if min == u64::MAX { 0 } else { min },
            max_nanos: max,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LatencyStats {
    pub tick: OperationLatencyStats,
    pub sweep: OperationLatencyStats,
    pub execution: OperationLatencyStats,
}

#[derive(Debug, Clone)]
pub struct OperationLatencyStats {
    pub operation: String,
    pub samples: u64,
    pub avg_nanos: u64,
    pub min_nanos: u64,
    pub max_nanos: u64,
}

impl OperationLatencyStats {
    pub fn avg_micros(&self) -> f64 {
        self.avg_nanos as f64 / 1_000.0
    }

    pub fn min_micros(&self) -> f64 {
        self.min_nanos as f64 / 1_000.0
    }

    pub fn max_micros(&self) -> f64 {
        self.max_nanos as f64 / 1_000.0
    }
}

/// Background metrics reporter
pub struct MetricsReporter {
    metrics: Arc<MonitorMetrics>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<MonitorMetrics>, interval: Duration) -> Self {
        Self { metrics, interval }
    }

    pub async fn run(&self) {
        let mut interval = periodic(self.interval);

        loop {
            interval.tick().await;
            info!("{}", self.summary());
        }
    }

    /// One-line snapshot as logged by [`run`](Self::run).
    pub fn summary(&self) -> String {
        let stats = self.metrics.get_latency_stats();
        format!(
            "Monitor Metrics - Pending: {} on {} instruments | Orders: +{} -{} expired={} | Executions: ok={} failed={} | Ticks: {} Evals: {} | Latency (μs): tick={:.2} sweep={:.2} exec={:.2}",
            self.metrics.get_pending_orders(),
            self.metrics.get_tracked_instruments(),
            self.metrics.get_orders_added(),
            self.metrics.get_orders_removed(),
            self.metrics.get_orders_expired(),
            self.metrics.get_executions_succeeded(),
            self.metrics.get_executions_failed(),
            self.metrics.get_ticks_processed(),
            self.metrics.get_evaluations(),
            stats.tick.avg_micros(),
            stats.sweep.avg_micros(),
            stats.execution.avg_micros()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_gauges() {
        let metrics = MonitorMetrics::new();
        metrics.increment_orders_added();
        metrics.increment_orders_added();
        metrics.increment_orders_removed();
        metrics.increment_executions_failed();
        metrics.set_pending_orders(1);
        metrics.set_tracked_instruments(1);

        assert_eq!(metrics.get_orders_added(), 2);
        assert_eq!(metrics.get_orders_removed(), 1);
        assert_eq!(metrics.get_executions_failed(), 1);
        assert_eq!(metrics.get_executions_succeeded(), 0);
        assert_eq!(metrics.get_pending_orders(), 1);
    }

    #[test]
    fn test_latency_stats() {
        let metrics = MonitorMetrics::new();
        metrics.record_tick_latency(Duration::from_micros(10));
        metrics.record_tick_latency(Duration::from_micros(30));

        let stats = metrics.get_latency_stats();
        assert_eq!(stats.tick.samples, 2);
        assert_eq!(stats.tick.avg_nanos, 20_000);
        assert_eq!(stats.tick.min_nanos, 10_000);
        assert_eq!(stats.tick.max_nanos, 30_000);
        assert_eq!(stats.sweep.samples, 0);
        assert_eq!(stats.sweep.min_nanos, 0);
    }

    #[test]
    fn test_reporter_summary() {
        let metrics = Arc::new(MonitorMetrics::new());
        metrics.set_pending_orders(3);
        let reporter = MetricsReporter::new(metrics, Duration::from_secs(1));
        assert!(reporter.summary().contains("Pending: 3"));
    }
}
