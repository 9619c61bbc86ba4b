//! Diagnostics counters for accesses that cannot be made atomic.
//!
//! Both counters are monotone and updated with relaxed increments from
//! inside the signal handler; losing an increment under a race is
//! acceptable, taking a lock is not.

use std::sync::atomic::{AtomicU64, Ordering};

static SPLIT_LOCK_ACROSS_CACHELINE: AtomicU64 = AtomicU64::new(0);
static SPLIT_16BYTE: AtomicU64 = AtomicU64::new(0);

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    /// Accesses that crossed a 64-byte cacheline, the x86 split-lock case.
    pub split_lock_across_cacheline: u64,
    /// Accesses that crossed a 16-byte boundary and went through the
    /// tearing dual-CAS path.
    pub split_16byte: u64,
}

pub(crate) fn record_split_lock() {
    SPLIT_LOCK_ACROSS_CACHELINE.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_split_16byte() {
    SPLIT_16BYTE.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> Telemetry {
    Telemetry {
        split_lock_across_cacheline: SPLIT_LOCK_ACROSS_CACHELINE.load(Ordering::Relaxed),
        split_16byte: SPLIT_16BYTE.load(Ordering::Relaxed),
    }
}
