use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Running counters, updated lock-free by workers
#[derive(Debug, Default)]
pub(crate) struct BusCounters {
    sent: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
    total_latency_ms: AtomicU64,
}

impl BusCounters {
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self, latency: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, agents: usize, queue_depths: BTreeMap<String, usize>) -> BusStats {
        let completed = self.completed.load(Ordering::Relaxed);
        let total_latency_ms = self.total_latency_ms.load(Ordering::Relaxed);
        BusStats {
            agents,
            sent: self.sent.load(Ordering::Relaxed),
            completed,
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            avg_latency_ms: if completed > 0 {
                total_latency_ms as f64 / completed as f64
            } else {
                0.0
            },
            queue_depths,
        }
    }
}

/// Point-in-time view of bus activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusStats {
    pub agents: usize,
    /// Messages accepted by `send`/`broadcast`
    pub sent: u64,
    pub completed: u64,
    pub failed: u64,
    /// Re-deliveries after a retryable failure
    pub retried: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    /// Sends refused because a queue was full
    pub rejected: u64,
    pub avg_latency_ms: f64,
    pub queue_depths: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_latency_over_completed_only() {
        let counters = BusCounters::default();
        counters.record_sent();
        counters.record_sent();
        counters.record_completed(Duration::from_millis(10));
        counters.record_completed(Duration::from_millis(30));
        counters.record_failed();

        let stats = counters.snapshot(2, BTreeMap::new());
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.avg_latency_ms, 20.0);
    }
}
