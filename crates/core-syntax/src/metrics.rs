//! Observational counters, in the same relaxed-atomics style this
//! codebase's other incremental engines expose their own metrics in. These
//! never feed back into scheduling decisions; they exist for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheMetrics {
    lines_tokenized: AtomicU64,
    skip_ahead_hits: AtomicU64,
    slices_run: AtomicU64,
    tokenizer_failures: AtomicU64,
}

impl CacheMetrics {
    pub fn record_line_tokenized(&self) {
        self.lines_tokenized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip_ahead(&self) {
        self.skip_ahead_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slice(&self) {
        self.slices_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tokenizer_failure(&self) {
        self.tokenizer_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lines_tokenized: self.lines_tokenized.load(Ordering::Relaxed),
            skip_ahead_hits: self.skip_ahead_hits.load(Ordering::Relaxed),
            slices_run: self.slices_run.load(Ordering::Relaxed),
            tokenizer_failures: self.tokenizer_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub lines_tokenized: u64,
    pub skip_ahead_hits: u64,
    pub slices_run: u64,
    pub tokenizer_failures: u64,
}
