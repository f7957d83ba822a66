//! Allocation statistics counters.
//!
//! All counters use `Relaxed` ordering -- they are observational only and
//! not used as synchronization primitives. The allocator's own locks
//! provide the ordering guarantees for correctness; these counters are
//! purely for monitoring.
//!
//! Individual counter loads are each atomic but a [`Snapshot`] as a whole
//! is not globally consistent -- concurrent allocator activity may race
//! between loads. Gated behind the `stats` feature; with it disabled, the
//! `stat_inc!`/`stat_add!` call sites compile to nothing.

use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Stats {
    /// Total calls to `allocate` resolved through a `Cache`.
    pub alloc_count: AtomicU64,
    /// Total calls to `deallocate` resolved through a `Cache`.
    pub dealloc_count: AtomicU64,
    /// Allocations served by the system allocator (size-class overflow).
    pub large_alloc_count: AtomicU64,
    /// Deallocations that missed the owning thread's `Bucket` and were
    /// handed to the foreign-deallocation registry.
    pub foreign_dealloc_count: AtomicU64,
    /// Foreign deallocations successfully drained and applied to their
    /// owning `Cache`.
    pub foreign_drain_count: AtomicU64,
    /// Times the dispatcher grew by requesting new superblocks from the
    /// system allocator.
    pub dispatcher_growths: AtomicU64,
    /// Times a thread acquiring the shared mutex's reader path fell back
    /// to the spill lock (unregistered or slots exhausted).
    pub shared_mutex_spills: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            alloc_count: AtomicU64::new(0),
            dealloc_count: AtomicU64::new(0),
            large_alloc_count: AtomicU64::new(0),
            foreign_dealloc_count: AtomicU64::new(0),
            foreign_drain_count: AtomicU64::new(0),
            dispatcher_growths: AtomicU64::new(0),
            shared_mutex_spills: AtomicU64::new(0),
        }
    }
}

pub(crate) static STATS: Stats = Stats::new();

/// A point-in-time snapshot of all allocation statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    pub alloc_count: u64,
    pub dealloc_count: u64,
    pub large_alloc_count: u64,
    pub foreign_dealloc_count: u64,
    pub foreign_drain_count: u64,
    pub dispatcher_growths: u64,
    pub shared_mutex_spills: u64,
}

/// Load all counters with `Relaxed` ordering and return a [`Snapshot`].
pub fn snapshot() -> Snapshot {
    let s = &STATS;
    Snapshot {
        alloc_count: s.alloc_count.load(Ordering::Relaxed),
        dealloc_count: s.dealloc_count.load(Ordering::Relaxed),
        large_alloc_count: s.large_alloc_count.load(Ordering::Relaxed),
        foreign_dealloc_count: s.foreign_dealloc_count.load(Ordering::Relaxed),
        foreign_drain_count: s.foreign_drain_count.load(Ordering::Relaxed),
        dispatcher_growths: s.dispatcher_growths.load(Ordering::Relaxed),
        shared_mutex_spills: s.shared_mutex_spills.load(Ordering::Relaxed),
    }
}
