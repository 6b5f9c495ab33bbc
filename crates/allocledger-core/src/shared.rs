//! Mutex-guarded tracker for multi-threaded hosts.
//!
//! [`AllocTracker`] itself has no synchronization. `SharedTracker` holds one
//! lock across each whole call (layout + append on allocate, lookup + flag
//! update + release on free), so the per-call contract is unchanged.

use std::io::{self, Write};
use std::ptr::NonNull;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::error::TrackError;
use crate::heap::{RawHeap, SystemHeap};
use crate::record::AllocKind;
use crate::report::{AddressStyle, LedgerReport};
use crate::tracker::{AllocTracker, FreeOutcome};

#[derive(Debug)]
pub struct SharedTracker<H: RawHeap = SystemHeap> {
    inner: Mutex<AllocTracker<H>>,
}

impl<H: RawHeap> SharedTracker<H> {
    #[must_use]
    pub fn new(tracker: AllocTracker<H>) -> Self {
        Self {
            inner: Mutex::new(tracker),
        }
    }

    pub fn allocate(
        &self,
        size: usize,
        file: &'static str,
        line: u32,
    ) -> Result<NonNull<u8>, TrackError> {
        self.inner.lock().allocate(size, file, line)
    }

    pub fn allocate_as(
        &self,
        kind: AllocKind,
        size: usize,
        file: &'static str,
        line: u32,
    ) -> Result<NonNull<u8>, TrackError> {
        self.inner.lock().allocate_as(kind, size, file, line)
    }

    pub fn deallocate(
        &self,
        ptr: *mut u8,
        file: &'static str,
        line: u32,
    ) -> Result<FreeOutcome, TrackError> {
        self.inner.lock().deallocate(ptr, file, line)
    }

    pub fn deallocate_as(
        &self,
        kind: AllocKind,
        ptr: *mut u8,
        file: &'static str,
        line: u32,
    ) -> Result<FreeOutcome, TrackError> {
        self.inner.lock().deallocate_as(kind, ptr, file, line)
    }

    pub fn report<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        self.inner.lock().report(out)
    }

    pub fn report_with<W: Write + ?Sized>(
        &self,
        out: &mut W,
        style: AddressStyle,
    ) -> io::Result<()> {
        self.inner.lock().report_with(out, style)
    }

    pub fn snapshot(&self) -> LedgerReport {
        self.inner.lock().snapshot()
    }

    /// Run `f` with exclusive access to the tracker.
    pub fn with<R>(&self, f: impl FnOnce(&mut AllocTracker<H>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    #[must_use]
    pub fn into_inner(self) -> AllocTracker<H> {
        self.inner.into_inner()
    }
}

static GLOBAL_TRACKER: OnceLock<SharedTracker> = OnceLock::new();

/// Process-wide tracker behind the `track_*!` macros.
///
/// Built on first use from the environment configuration.
#[must_use]
pub fn global_tracker() -> &'static SharedTracker {
    GLOBAL_TRACKER.get_or_init(|| SharedTracker::new(AllocTracker::from_env()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn threads_share_one_ledger() {
        let shared = Arc::new(SharedTracker::new(AllocTracker::new(TrackerConfig::new())));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let p = shared.allocate(8 + i, "t.rs", 1).expect("alloc");
                        let out = shared.deallocate(p.as_ptr(), "t.rs", 2).expect("free");
                        assert_eq!(out, FreeOutcome::Released);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("worker");
        }
        let report = shared.snapshot();
        assert_eq!(report.totals.allocations, 200);
        assert_eq!(report.totals.deallocations, 200);
        assert!(report.is_clean());
    }

    #[test]
    fn with_exposes_the_tracker() {
        let shared = SharedTracker::new(AllocTracker::new(TrackerConfig::new()));
        shared.allocate(4, "w.rs", 1).expect("alloc");
        assert_eq!(shared.with(|t| t.store().len()), 1);
        assert_eq!(shared.into_inner().metrics().mallocs, 1);
    }
}
