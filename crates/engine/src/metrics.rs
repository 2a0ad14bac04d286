//! Sink metrics: atomic counters with point-in-time snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by a sink across its lifetime.
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Total payload bytes accepted by `write`/`write_record`.
    pub bytes_written: AtomicU64,

    /// Total accepted write calls.
    pub records_written: AtomicU64,

    /// Generations installed after the first.
    pub rotations: AtomicU64,

    /// Write and factory errors surfaced to callers.
    pub write_errors: AtomicU64,

    /// Empty generations removed by the drop policy.
    pub empty_dropped: AtomicU64,
}

impl SinkMetrics {
    pub const fn new() -> Self {
        Self {
            bytes_written: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            empty_dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_write(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.records_written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_empty_dropped(&self) {
        self.empty_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            empty_dropped: self.empty_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SinkMetrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub bytes_written: u64,
    pub records_written: u64,
    pub rotations: u64,
    pub write_errors: u64,
    pub empty_dropped: u64,
}
