//! Run metrics collection and progress reporting
//!
//! [`RunMetrics`] keeps in-process atomics for progress and ETA, and mirrors
//! each observation to the `metrics` facade so an installed exporter (e.g.
//! Prometheus) sees the same series.

use newslabel_core::ClassificationOutcome;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics collector for one batch run
#[derive(Clone)]
pub struct RunMetrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    started: Instant,
    total_records: u64,
    already_done: u64,
    concurrency: u64,
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    total_latency_ms: AtomicU64,
    // f64 bits
    session_cost: AtomicU64,
}

impl RunMetrics {
    /// Create a collector for a run over `total_records`, of which
    /// `already_done` were completed by earlier runs
    pub fn new(total_records: u64, already_done: u64, concurrency: usize) -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                started: Instant::now(),
                total_records,
                already_done,
                concurrency: concurrency.max(1) as u64,
                processed: AtomicU64::new(0),
                succeeded: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                input_tokens: AtomicU64::new(0),
                output_tokens: AtomicU64::new(0),
                total_latency_ms: AtomicU64::new(0),
                session_cost: AtomicU64::new(0f64.to_bits()),
            }),
        }
    }

    /// Record a committed outcome and how long the record took end to end
    pub fn record_outcome(&self, outcome: &ClassificationOutcome, latency: Duration) {
        let inner = &self.inner;
        inner.processed.fetch_add(1, Ordering::Relaxed);
        let status = if outcome.success {
            inner.succeeded.fetch_add(1, Ordering::Relaxed);
            "success"
        } else {
            inner.failed.fetch_add(1, Ordering::Relaxed);
            "failure"
        };
        inner
            .input_tokens
            .fetch_add(outcome.usage.input_tokens as u64, Ordering::Relaxed);
        inner
            .output_tokens
            .fetch_add(outcome.usage.output_tokens as u64, Ordering::Relaxed);
        inner
            .total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
        let _ = inner
            .session_cost
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + outcome.cost).to_bits())
            });

        ::metrics::counter!("newslabel_records_total", "status" => status).increment(1);
        ::metrics::counter!("newslabel_tokens_total", "direction" => "input")
            .increment(outcome.usage.input_tokens as u64);
        ::metrics::counter!("newslabel_tokens_total", "direction" => "output")
            .increment(outcome.usage.output_tokens as u64);
        ::metrics::histogram!("newslabel_record_latency_ms").record(latency.as_millis() as f64);
    }

    /// Publish the cumulative run cost (including earlier runs)
    pub fn record_total_cost(&self, total_cost: f64) {
        ::metrics::gauge!("newslabel_cost_usd_total").set(total_cost);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            total_records: inner.total_records,
            already_done: inner.already_done,
            concurrency: inner.concurrency,
            processed: inner.processed.load(Ordering::Relaxed),
            succeeded: inner.succeeded.load(Ordering::Relaxed),
            failed: inner.failed.load(Ordering::Relaxed),
            input_tokens: inner.input_tokens.load(Ordering::Relaxed),
            output_tokens: inner.output_tokens.load(Ordering::Relaxed),
            total_latency_ms: inner.total_latency_ms.load(Ordering::Relaxed),
            session_cost: f64::from_bits(inner.session_cost.load(Ordering::Relaxed)),
            elapsed: inner.started.elapsed(),
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_records: u64,
    pub already_done: u64,
    pub concurrency: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_latency_ms: u64,
    pub session_cost: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Calculate average latency per processed record
    pub fn avg_latency_ms(&self) -> u64 {
        if self.processed == 0 {
            0
        } else {
            self.total_latency_ms / self.processed
        }
    }

    /// Records finished, counting earlier runs
    pub fn done(&self) -> u64 {
        self.already_done + self.processed
    }

    pub fn remaining(&self) -> u64 {
        self.total_records.saturating_sub(self.done())
    }

    /// Percentage of the range finished
    pub fn percent(&self) -> f64 {
        if self.total_records == 0 {
            100.0
        } else {
            self.done() as f64 / self.total_records as f64 * 100.0
        }
    }

    /// Average per-record latency times remaining records, spread over the workers
    pub fn eta(&self) -> Option<Duration> {
        if self.processed == 0 {
            return None;
        }
        let millis = self.avg_latency_ms() * self.remaining() / self.concurrency;
        Some(Duration::from_millis(millis))
    }
}
