//! Invocation metrics and correlation ids.
//!
//! Counters are plain atomics; `health_check` reports a snapshot of them and
//! shutdown uses the in-flight gauge to drain outstanding invocations.

use crate::error::ErrorKind;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Generate a short correlation ID (8 characters) for compact logging.
pub fn generate_short_correlation_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Gateway-wide invocation counters.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    pub invocations_total: AtomicU64,
    pub invocations_succeeded: AtomicU64,
    pub validation_errors: AtomicU64,
    pub not_found_errors: AtomicU64,
    pub connectivity_errors: AtomicU64,
    pub execution_errors: AtomicU64,
    pub invocation_time_ms_total: AtomicU64,
    in_flight: AtomicUsize,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an invocation as started; the guard marks it finished on drop.
    pub fn start_invocation(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            metrics: Arc::clone(self),
        }
    }

    /// Record the outcome of a finished invocation.
    pub fn record(&self, outcome: Result<(), ErrorKind>, duration: Duration) {
        self.invocations_total.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Ok(()) => &self.invocations_succeeded,
            Err(ErrorKind::Validation) => &self.validation_errors,
            Err(ErrorKind::NotFound) => &self.not_found_errors,
            Err(ErrorKind::Connectivity) => &self.connectivity_errors,
            Err(ErrorKind::Execution) => &self.execution_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.invocation_time_ms_total
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            invocations_total: self.invocations_total.load(Ordering::Relaxed),
            invocations_succeeded: self.invocations_succeeded.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            not_found_errors: self.not_found_errors.load(Ordering::Relaxed),
            connectivity_errors: self.connectivity_errors.load(Ordering::Relaxed),
            execution_errors: self.execution_errors.load(Ordering::Relaxed),
            invocation_time_ms_total: self.invocation_time_ms_total.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }
}

/// Decrements the in-flight gauge when dropped.
pub struct InFlightGuard {
    metrics: Arc<GatewayMetrics>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub invocations_total: u64,
    pub invocations_succeeded: u64,
    pub validation_errors: u64,
    pub not_found_errors: u64,
    pub connectivity_errors: u64,
    pub execution_errors: u64,
    pub invocation_time_ms_total: u64,
    pub in_flight: usize,
}

impl MetricsSnapshot {
    /// Calculate average invocation time in milliseconds.
    pub fn avg_invocation_time_ms(&self) -> f64 {
        if self.invocations_total == 0 {
            return 0.0;
        }
        self.invocation_time_ms_total as f64 / self.invocations_total as f64
    }
}

/// Shared metrics type for thread-safe access.
pub type SharedMetrics = Arc<GatewayMetrics>;
