//! Per-device streaming counters (atomic, shared between worker and host)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct StreamStats {
    pub sessions_started: AtomicU64,
    pub calibration_failures: AtomicU64,
    pub blocks_delivered: AtomicU64,
    pub samples_delivered: AtomicU64,
    pub blocks_retained: AtomicU64,
    pub blocks_freed: AtomicU64,
    pub read_failures: AtomicU64,
    pub short_reads: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub sessions_started: u64,
    pub calibration_failures: u64,
    pub blocks_delivered: u64,
    pub samples_delivered: u64,
    pub blocks_retained: u64,
    pub blocks_freed: u64,
    pub read_failures: u64,
    pub short_reads: u64,
}

impl StreamStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            calibration_failures: self.calibration_failures.load(Ordering::Relaxed),
            blocks_delivered: self.blocks_delivered.load(Ordering::Relaxed),
            samples_delivered: self.samples_delivered.load(Ordering::Relaxed),
            blocks_retained: self.blocks_retained.load(Ordering::Relaxed),
            blocks_freed: self.blocks_freed.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            short_reads: self.short_reads.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
