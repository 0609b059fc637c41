// Counters for the order engine
//
// Lock-free; cloned handles share the same counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bulk runs slower than this are logged (500ms)
const SLOW_BULK_THRESHOLD_MS: u64 = 500;

#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    orders_created: AtomicU64,
    orders_cancelled: AtomicU64,
    orders_deleted: AtomicU64,
    schedule_changes: AtomicU64,

    stock_reservation_failures: AtomicU64,
    stock_release_failures: AtomicU64,

    bulk_actions: AtomicU64,
    bulk_orders_mutated: AtomicU64,
    bulk_orders_failed: AtomicU64,
    total_bulk_time_us: AtomicU64,
    slow_bulk_actions: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_order_created(&self) {
        self.inner.orders_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order_cancelled(&self) {
        self.inner.orders_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order_deleted(&self) {
        self.inner.orders_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_schedule_change(&self) {
        self.inner.schedule_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// A reserve call found too little stock
    pub fn record_stock_reservation_failure(&self) {
        self.inner.stock_reservation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A best-effort release failed and was swallowed
    pub fn record_stock_release_failure(&self) {
        self.inner.stock_release_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bulk_outcome(&self, mutated: usize, failed: usize) {
        self.inner.bulk_orders_mutated.fetch_add(mutated as u64, Ordering::Relaxed);
        self.inner.bulk_orders_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    /// Start timing a bulk run; recorded when the timer is dropped
    pub fn start_bulk_action(&self) -> OperationTimer {
        OperationTimer {
            start: Instant::now(),
            metrics: self.clone(),
        }
    }

    fn record_bulk_duration(&self, duration: Duration) {
        self.inner.bulk_actions.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_bulk_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        if duration.as_millis() as u64 > SLOW_BULK_THRESHOLD_MS {
            self.inner.slow_bulk_actions.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Slow bulk schedule action: {}ms", duration.as_millis());
        }
    }

    /// Average bulk run time in milliseconds
    pub fn avg_bulk_time_ms(&self) -> f64 {
        let count = self.inner.bulk_actions.load(Ordering::Relaxed);
        let total_us = self.inner.total_bulk_time_us.load(Ordering::Relaxed);

        if count == 0 {
            0.0
        } else {
            (total_us as f64 / count as f64) / 1000.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        MetricsSnapshot {
            orders_created: load(&self.inner.orders_created),
            orders_cancelled: load(&self.inner.orders_cancelled),
            orders_deleted: load(&self.inner.orders_deleted),
            schedule_changes: load(&self.inner.schedule_changes),
            stock_reservation_failures: load(&self.inner.stock_reservation_failures),
            stock_release_failures: load(&self.inner.stock_release_failures),
            bulk_actions: load(&self.inner.bulk_actions),
            bulk_orders_mutated: load(&self.inner.bulk_orders_mutated),
            bulk_orders_failed: load(&self.inner.bulk_orders_failed),
            avg_bulk_time_ms: self.avg_bulk_time_ms(),
            slow_bulk_actions: load(&self.inner.slow_bulk_actions),
        }
    }
}

pub struct OperationTimer {
    start: Instant,
    metrics: EngineMetrics,
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.metrics.record_bulk_duration(self.start.elapsed());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub orders_created: u64,
    pub orders_cancelled: u64,
    pub orders_deleted: u64,
    pub schedule_changes: u64,
    pub stock_reservation_failures: u64,
    pub stock_release_failures: u64,
    pub bulk_actions: u64,
    pub bulk_orders_mutated: u64,
    pub bulk_orders_failed: u64,
    pub avg_bulk_time_ms: f64,
    pub slow_bulk_actions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = EngineMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.orders_created, 0);
        assert_eq!(snapshot.avg_bulk_time_ms, 0.0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = EngineMetrics::new();
        let handle = metrics.clone();

        handle.record_order_created();
        handle.record_order_created();
        metrics.record_stock_release_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.orders_created, 2);
        assert_eq!(snapshot.stock_release_failures, 1);
    }

    #[test]
    fn test_bulk_timer_records_once() {
        let metrics = EngineMetrics::new();

        {
            let _timer = metrics.start_bulk_action();
            thread::sleep(Duration::from_millis(10));
        }
        metrics.record_bulk_outcome(3, 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bulk_actions, 1);
        assert_eq!(snapshot.bulk_orders_mutated, 3);
        assert_eq!(snapshot.bulk_orders_failed, 1);
        assert!(snapshot.avg_bulk_time_ms >= 10.0);
    }
}
