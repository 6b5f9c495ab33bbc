//! Ledger operation counters.
//!
//! All counters use relaxed ordering; they are diagnostic tallies, not
//! synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::record::AllocKind;

/// Counters maintained alongside the record store.
#[derive(Debug)]
pub struct LedgerMetrics {
    /// Successful `malloc`-family allocations.
    pub mallocs: AtomicU64,
    /// Successful `new`-family allocations.
    pub news: AtomicU64,
    /// Releases through the `malloc` family (double frees excluded).
    pub frees: AtomicU64,
    /// Releases through the `new` family (double frees excluded).
    pub deletes: AtomicU64,
    /// Bytes requested by successful allocations, guard words excluded.
    pub bytes_requested: AtomicU64,
    /// Allocations the heap could not satisfy.
    pub failed_allocations: AtomicU64,
    /// Frees of an already-freed address.
    pub double_frees: AtomicU64,
    /// Frees of addresses the ledger never handed out.
    pub unknown_frees: AtomicU64,
    /// Records whose guard words were newly found corrupted.
    pub guard_violations: AtomicU64,
}

impl LedgerMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mallocs: AtomicU64::new(0),
            news: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            bytes_requested: AtomicU64::new(0),
            failed_allocations: AtomicU64::new(0),
            double_frees: AtomicU64::new(0),
            unknown_frees: AtomicU64::new(0),
            guard_violations: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Count a successful allocation of `size` bytes.
    pub fn record_allocation(&self, kind: AllocKind, size: usize) {
        match kind {
            AllocKind::Malloc => Self::inc(&self.mallocs),
            AllocKind::New => Self::inc(&self.news),
        }
        Self::add(&self.bytes_requested, size as u64);
    }

    /// Count a release that reached the heap.
    pub fn record_release(&self, kind: AllocKind) {
        match kind {
            AllocKind::Malloc => Self::inc(&self.frees),
            AllocKind::New => Self::inc(&self.deletes),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            mallocs: Self::get(&self.mallocs),
            news: Self::get(&self.news),
            frees: Self::get(&self.frees),
            deletes: Self::get(&self.deletes),
            bytes_requested: Self::get(&self.bytes_requested),
            failed_allocations: Self::get(&self.failed_allocations),
            double_frees: Self::get(&self.double_frees),
            unknown_frees: Self::get(&self.unknown_frees),
            guard_violations: Self::get(&self.guard_violations),
        }
    }
}

impl Default for LedgerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`LedgerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub mallocs: u64,
    pub news: u64,
    pub frees: u64,
    pub deletes: u64,
    pub bytes_requested: u64,
    pub failed_allocations: u64,
    pub double_frees: u64,
    pub unknown_frees: u64,
    pub guard_violations: u64,
}

impl MetricsSnapshot {
    /// Successful allocations across both families.
    #[must_use]
    pub const fn allocations(&self) -> u64 {
        self.mallocs + self.news
    }

    /// Heap releases across both families.
    #[must_use]
    pub const fn deallocations(&self) -> u64 {
        self.frees + self.deletes
    }
}
