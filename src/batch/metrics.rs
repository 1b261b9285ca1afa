//! Lock-free run counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::record::PaperRecord;

/// Aggregate counters updated by every worker.
#[derive(Debug)]
pub struct BatchMetrics {
    total: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    errors: AtomicU64,
    needs_review: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    started_at: Instant,
}

impl Default for BatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            needs_review: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// Papers restored from a checkpoint instead of being screened.
    pub fn record_skipped(&self, count: u64) {
        self.skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record(&self, record: &PaperRecord) {
        if record.is_completed() {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        if record.needs_review() {
            self.needs_review.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(result) = &record.result {
            for outcome in &result.engine_outcomes {
                self.input_tokens
                    .fetch_add(outcome.usage.input_tokens, Ordering::Relaxed);
                self.output_tokens
                    .fetch_add(outcome.usage.output_tokens, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let completed = self.completed.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let processed = completed + errors;
        let elapsed_ms = self.started_at.elapsed().as_millis() as u64;
        let papers_per_minute = if elapsed_ms > 0 {
            processed as f64 * 60_000.0 / elapsed_ms as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            processed,
            completed,
            errors,
            needs_review: self.needs_review.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
            elapsed_ms,
            papers_per_minute,
        }
    }
}

/// Point-in-time copy of [`BatchMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub skipped: u64,
    /// Papers screened in this run (completed + errors).
    pub processed: u64,
    pub completed: u64,
    pub errors: u64,
    pub needs_review: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed_ms: u64,
    pub papers_per_minute: f64,
}

impl MetricsSnapshot {
    pub fn remaining(&self) -> u64 {
        self.total
            .saturating_sub(self.skipped)
            .saturating_sub(self.processed)
    }
}
