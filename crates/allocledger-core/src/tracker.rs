//! Tracked allocate / deallocate entry points.
//!
//! [`AllocTracker`] owns the heap handle, the record store, the counters and
//! the trace emitter. It is a plain single-threaded context object; wrap it in
//! [`SharedTracker`](crate::SharedTracker) to call it from several threads.
//!
//! Dropping a tracker does not release blocks that were never freed: the host
//! may still be using them.

#![allow(unsafe_code)]

use std::io::{self, Write};
use std::ptr::NonNull;

use crate::config::{TrackerConfig, global_config};
use crate::error::TrackError;
use crate::guard::{self, PaddedAllocation};
use crate::heap::{RawHeap, SystemHeap};
use crate::metrics::{LedgerMetrics, MetricsSnapshot};
use crate::origin::Origin;
use crate::record::{AllocKind, AllocationRecord};
use crate::report::{AddressStyle, LedgerReport};
use crate::store::RecordStore;
use crate::trace::{TraceEmitter, TraceEvent};

/// What a deallocation call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeOutcome {
    /// Null pointer; nothing to do.
    Null,
    /// Guard words intact, block returned to the heap.
    Released,
    /// Block returned to the heap, but its guard words were damaged.
    ReleasedCorrupted { overran: bool, underran: bool },
    /// Address was already freed. Recorded; the heap was not called.
    DoubleFree,
}

impl FreeOutcome {
    /// True if the block went back to the heap.
    #[must_use]
    pub const fn released(self) -> bool {
        matches!(self, Self::Released | Self::ReleasedCorrupted { .. })
    }
}

/// Allocation ledger bound to a backing heap.
#[derive(Debug)]
pub struct AllocTracker<H: RawHeap = SystemHeap> {
    config: TrackerConfig,
    heap: H,
    store: RecordStore,
    metrics: LedgerMetrics,
    tracer: TraceEmitter,
}

impl AllocTracker<SystemHeap> {
    /// Tracker over the C library heap, tracing to stdout per `config`.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_heap(SystemHeap, config)
    }

    /// Tracker configured from `ALLOCLEDGER_TRACE` / `ALLOCLEDGER_GUARDS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(global_config())
    }
}

impl Default for AllocTracker<SystemHeap> {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl<H: RawHeap> AllocTracker<H> {
    #[must_use]
    pub fn with_heap(heap: H, config: TrackerConfig) -> Self {
        Self {
            config,
            heap,
            store: RecordStore::new(),
            metrics: LedgerMetrics::new(),
            tracer: TraceEmitter::to_stdout(config.trace),
        }
    }

    /// Replace the trace emitter (the default writes to stdout).
    #[must_use]
    pub fn with_tracer(mut self, tracer: TraceEmitter) -> Self {
        self.tracer = tracer;
        self
    }

    #[must_use]
    pub fn config(&self) -> TrackerConfig {
        self.config
    }

    #[must_use]
    pub fn heap(&self) -> &H {
        &self.heap
    }

    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The record an address currently resolves to.
    #[must_use]
    pub fn record_for(&self, ptr: *const u8) -> Option<&AllocationRecord> {
        self.store.find(ptr as usize).and_then(|idx| self.store.get(idx))
    }

    fn live(&self) -> u64 {
        let snap = self.metrics.snapshot();
        snap.allocations().saturating_sub(snap.deallocations())
    }

    /// `malloc`-family allocation of `size` bytes.
    pub fn allocate(
        &mut self,
        size: usize,
        file: &'static str,
        line: u32,
    ) -> Result<NonNull<u8>, TrackError> {
        self.allocate_as(AllocKind::Malloc, size, file, line)
    }

    /// Allocate `size` bytes and record the call site.
    ///
    /// On heap failure nothing is recorded and the error is returned.
    pub fn allocate_as(
        &mut self,
        kind: AllocKind,
        size: usize,
        file: &'static str,
        line: u32,
    ) -> Result<NonNull<u8>, TrackError> {
        let origin = Origin::new(file, line);
        let guarded = self.config.guards.enabled();

        let Some(base) = guard::padded_size(size, guarded).and_then(|n| self.heap.acquire(n))
        else {
            LedgerMetrics::inc(&self.metrics.failed_allocations);
            self.tracer.emit(&TraceEvent::AllocationFailed { kind, size, origin });
            return Err(TrackError::AllocationFailure { size, origin });
        };

        let block = PaddedAllocation::from_base(base, size, guarded);
        // SAFETY: `base` is a fresh block of `padded_size(size, guarded)` bytes.
        unsafe { block.arm() };

        let user = block.user_region();
        let address = user.as_ptr() as usize;
        let idx = self.store.append(address, size, origin, kind, guarded);
        self.metrics.record_allocation(kind, size);

        let event = TraceEvent::Allocated {
            seq: idx as u64 + 1,
            kind,
            address,
            size,
            origin,
            live: self.live(),
        };
        self.tracer.emit(&event);
        Ok(user)
    }

    /// `free`-family deallocation.
    pub fn deallocate(
        &mut self,
        ptr: *mut u8,
        file: &'static str,
        line: u32,
    ) -> Result<FreeOutcome, TrackError> {
        self.deallocate_as(AllocKind::Malloc, ptr, file, line)
    }

    /// Release a pointer previously returned by [`allocate_as`](Self::allocate_as).
    ///
    /// A second free of the same address is recorded as a double free and
    /// never reaches the heap. A pointer the ledger does not know is refused
    /// with [`TrackError::UnknownPointer`] and nothing is touched.
    pub fn deallocate_as(
        &mut self,
        kind: AllocKind,
        ptr: *mut u8,
        file: &'static str,
        line: u32,
    ) -> Result<FreeOutcome, TrackError> {
        if ptr.is_null() {
            return Ok(FreeOutcome::Null);
        }
        let origin = Origin::new(file, line);
        let address = ptr as usize;

        let Some(record) = self
            .store
            .find(address)
            .and_then(|idx| self.store.get_mut(idx))
        else {
            LedgerMetrics::inc(&self.metrics.unknown_frees);
            self.tracer
                .emit(&TraceEvent::UnknownPointer { address, origin });
            return Err(TrackError::UnknownPointer { address, origin });
        };

        if record.is_freed() {
            record.mark_double_freed(origin);
            let event = TraceEvent::DoubleFree {
                seq: record.seq,
                address,
                origin,
                allocated_at: record.origin,
            };
            LedgerMetrics::inc(&self.metrics.double_frees);
            self.tracer.emit(&event);
            return Ok(FreeOutcome::DoubleFree);
        }

        record.mark_freed();
        let before = record.status();
        // SAFETY: FREED was clear, so the block has not been returned yet.
        let check = unsafe { guard::verify(record) };
        let newly_corrupted = record.status() != before;
        let (seq, size, guarded, allocated_at) =
            (record.seq, record.size, record.guarded, record.origin);

        if newly_corrupted {
            LedgerMetrics::inc(&self.metrics.guard_violations);
            self.tracer.emit(&TraceEvent::GuardViolation {
                seq,
                address,
                overran: check.overran(),
                underran: check.underran(),
                allocated_at,
            });
        }

        if let Some(block) = PaddedAllocation::from_user(address, size, guarded) {
            // SAFETY: the block came from `self.heap.acquire` and this is its
            // first release (FREED was clear above).
            unsafe { self.heap.release(block.base()) };
        }
        self.metrics.record_release(kind);

        let event = TraceEvent::Freed {
            seq,
            kind,
            address,
            size,
            origin,
            live: self.live(),
        };
        self.tracer.emit(&event);

        Ok(if check.is_intact() {
            FreeOutcome::Released
        } else {
            FreeOutcome::ReleasedCorrupted {
                overran: check.overran(),
                underran: check.underran(),
            }
        })
    }

    /// Re-check the guard words of every record that was never freed.
    ///
    /// Returns the number of records newly flagged as corrupted.
    pub fn sweep(&mut self) -> usize {
        let mut events = Vec::new();
        for record in self.store.iter_mut().filter(|r| !r.is_freed()) {
            let before = record.status();
            // SAFETY: the record was never freed through the tracker, so its
            // block is still owned by the host and live.
            let check = unsafe { guard::verify(record) };
            if record.status() != before {
                events.push(TraceEvent::GuardViolation {
                    seq: record.seq,
                    address: record.address,
                    overran: check.overran(),
                    underran: check.underran(),
                    allocated_at: record.origin,
                });
            }
        }
        for event in &events {
            LedgerMetrics::inc(&self.metrics.guard_violations);
            self.tracer.emit(event);
        }
        events.len()
    }

    /// Sweep, then capture the ledger as a [`LedgerReport`].
    pub fn snapshot(&mut self) -> LedgerReport {
        self.sweep();
        LedgerReport::collect(&self.store, self.metrics.snapshot())
    }

    /// Sweep and write the plain-text report with raw addresses.
    pub fn report<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        self.report_with(out, AddressStyle::Raw)
    }

    /// Sweep and write the plain-text report.
    pub fn report_with<W: Write + ?Sized>(
        &mut self,
        out: &mut W,
        style: AddressStyle,
    ) -> io::Result<()> {
        self.snapshot().write_plain(out, style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GuardMode, TraceMode};
    use crate::guard::GUARD_WIDTH;

    fn tracker() -> AllocTracker {
        AllocTracker::new(TrackerConfig::new())
    }

    #[test]
    fn allocation_is_recorded_once() {
        let mut t = tracker();
        let p = t.allocate(16, "a.c", 10).expect("alloc");
        let rec = t.record_for(p.as_ptr()).expect("record");
        assert_eq!(rec.size, 16);
        assert_eq!(rec.origin, Origin::new("a.c", 10));
        assert!(!rec.is_freed());
        assert_eq!(t.store().len(), 1);
        assert_eq!(
            t.store().iter().filter(|r| r.address == p.as_ptr() as usize).count(),
            1
        );
    }

    #[test]
    fn free_marks_record_and_releases() {
        let mut t = tracker();
        let p = t.allocate(8, "a.c", 1).expect("alloc");
        let out = t.deallocate(p.as_ptr(), "a.c", 2).expect("free");
        assert_eq!(out, FreeOutcome::Released);
        let rec = t.store().get(0).expect("record");
        assert!(rec.is_freed());
        assert!(!rec.is_double_freed());
        assert_eq!(t.metrics().frees, 1);
    }

    #[test]
    fn second_free_is_double_free() {
        let mut t = tracker();
        let p = t.allocate(8, "a.c", 1).expect("alloc");
        t.deallocate(p.as_ptr(), "a.c", 2).expect("free");
        let out = t.deallocate(p.as_ptr(), "b.c", 3).expect("double free");
        assert_eq!(out, FreeOutcome::DoubleFree);
        assert!(!out.released());
        let rec = t.store().get(0).expect("record");
        assert_eq!(rec.double_free_origin(), Some(Origin::new("b.c", 3)));
        let snap = t.metrics();
        assert_eq!(snap.frees, 1);
        assert_eq!(snap.double_frees, 1);
    }

    #[test]
    fn null_free_is_noop() {
        let mut t = tracker();
        let out = t.deallocate(std::ptr::null_mut(), "a.c", 1).expect("null");
        assert_eq!(out, FreeOutcome::Null);
        assert_eq!(t.metrics(), MetricsSnapshot::default());
    }

    #[test]
    fn unknown_pointer_is_refused() {
        let mut t = tracker();
        let mut local = 0u8;
        let err = t
            .deallocate(&mut local as *mut u8, "x.c", 7)
            .expect_err("untracked");
        assert!(matches!(err, TrackError::UnknownPointer { .. }));
        assert_eq!(t.metrics().unknown_frees, 1);
        assert!(t.store().is_empty());
    }

    #[test]
    fn overrun_detected_at_free() {
        let mut t = tracker();
        let p = t.allocate(4, "c.c", 5).expect("alloc");
        // SAFETY: writes into the over guard word, which is inside the block.
        unsafe { p.as_ptr().add(4).write(0x41) };
        let out = t.deallocate(p.as_ptr(), "c.c", 6).expect("free");
        assert_eq!(
            out,
            FreeOutcome::ReleasedCorrupted {
                overran: true,
                underran: false
            }
        );
        assert!(t.store().get(0).expect("record").overran());
        assert_eq!(t.metrics().guard_violations, 1);
    }

    #[test]
    fn underrun_detected_by_sweep() {
        let mut t = tracker();
        let p = t.allocate(32, "u.c", 1).expect("alloc");
        // SAFETY: writes into the under guard word, which is inside the block.
        unsafe { p.as_ptr().sub(GUARD_WIDTH).write(0) };
        assert_eq!(t.sweep(), 1);
        assert_eq!(t.sweep(), 0);
        let rec = t.store().get(0).expect("record");
        assert!(rec.underran());
        assert!(!rec.overran());
        assert!(!rec.is_freed());
    }

    #[test]
    fn passthrough_mode_skips_guards() {
        let cfg = TrackerConfig::new().with_guards(GuardMode::Off);
        let mut t = AllocTracker::new(cfg);
        let p = t.allocate(4, "p.c", 1).expect("alloc");
        assert!(!t.store().get(0).expect("record").guarded);
        assert_eq!(t.deallocate(p.as_ptr(), "p.c", 2), Ok(FreeOutcome::Released));
    }

    #[test]
    fn zero_byte_allocation_is_tracked() {
        let mut t = tracker();
        let p = t.allocate(0, "z.c", 1).expect("alloc");
        assert_eq!(t.store().get(0).expect("record").size, 0);
        assert_eq!(t.deallocate(p.as_ptr(), "z.c", 2), Ok(FreeOutcome::Released));
    }

    #[test]
    fn new_family_counts_separately() {
        let mut t = tracker();
        let p = t.allocate_as(AllocKind::New, 24, "n.cpp", 1).expect("new");
        t.deallocate_as(AllocKind::New, p.as_ptr(), "n.cpp", 2)
            .expect("delete");
        let snap = t.metrics();
        assert_eq!((snap.news, snap.deletes), (1, 1));
        assert_eq!((snap.mallocs, snap.frees), (0, 0));
    }

    #[test]
    fn trace_text_reports_each_call() {
        let cfg = TrackerConfig::new().with_trace(TraceMode::Text);
        let (emitter, buf) = TraceEmitter::to_buffer(TraceMode::Text);
        let mut t = AllocTracker::new(cfg).with_tracer(emitter);
        let p = t.allocate(16, "a.c", 10).expect("alloc");
        t.deallocate(p.as_ptr(), "a.c", 11).expect("free");
        let text = buf.contents();
        assert!(text.contains("MALLOC:     16 bytes"));
        assert!(text.contains("FREED:"));
        assert!(text.contains("on line:    11"));
        assert!(text.contains("count:      0"));
    }

    #[test]
    fn trace_json_flags_double_free_and_guard_violation() {
        let cfg = TrackerConfig::new().with_trace(TraceMode::Json);
        let (emitter, buf) = TraceEmitter::to_buffer(TraceMode::Json);
        let mut t = AllocTracker::new(cfg).with_tracer(emitter);
        let p = t.allocate(4, "j.c", 1).expect("alloc");
        // SAFETY: first byte of the over guard word, inside the block.
        unsafe { p.as_ptr().add(4).write(0) };
        t.deallocate(p.as_ptr(), "j.c", 2).expect("free");
        t.deallocate(p.as_ptr(), "j.c", 3).expect("double free");

        let events: Vec<serde_json::Value> = buf
            .contents()
            .lines()
            .map(|l| serde_json::from_str(l).expect("valid json"))
            .collect();
        let names: Vec<_> = events
            .iter()
            .map(|e| e["event"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, ["allocated", "guard_violation", "freed", "double_free"]);

        let violation = &events[1];
        assert_eq!(violation["level"], "error");
        assert_eq!(violation["overran"], true);
        assert_eq!(violation["underran"], false);
        assert_eq!(violation["allocated_at"]["line"], 1);

        let double = &events[3];
        assert_eq!(double["level"], "error");
        assert_eq!(double["origin"]["line"], 3);
        assert_eq!(double["trace_seq"], 4);
    }
}
