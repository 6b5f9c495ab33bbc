//! Built-in host programs that misuse memory in known ways.
//!
//! Each scenario plays the part of an instrumented C program: it allocates
//! and frees through an [`AllocTracker`] using fixed call sites, so the
//! resulting report is identical from run to run once addresses are redacted.
//!
//! Guard-damaging writes land inside the padded block only when guard words
//! are enabled. With guards off those writes would hit memory outside the
//! block, so they are skipped and the scenario degrades to its leak and
//! double-free behavior.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use allocledger_core::{AllocKind, AllocTracker, RawHeap};
use serde::Serialize;

use crate::error::HarnessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    Leak,
    DoubleFree,
    Overrun,
    Underrun,
    Clean,
    Mixed,
}

impl Scenario {
    pub const ALL: [Self; 6] = [
        Self::Leak,
        Self::DoubleFree,
        Self::Overrun,
        Self::Underrun,
        Self::Clean,
        Self::Mixed,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Leak => "leak",
            Self::DoubleFree => "double-free",
            Self::Overrun => "overrun",
            Self::Underrun => "underrun",
            Self::Clean => "clean",
            Self::Mixed => "mixed",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Leak => "16-byte buffer filled and never freed",
            Self::DoubleFree => "8-byte buffer freed twice",
            Self::Overrun => "one byte written past a 4-byte buffer",
            Self::Underrun => "one byte written before a 12-byte buffer",
            Self::Clean => "balanced malloc/free and new/delete pairs",
            Self::Mixed => "every finding at once, across both families",
        }
    }

    #[must_use]
    pub const fn info(self) -> ScenarioInfo {
        ScenarioInfo {
            name: self.name(),
            description: self.description(),
        }
    }

    /// Parse a scenario name (case-insensitive, `_` accepted for `-`).
    pub fn from_name(name: &str) -> Result<Self, HarnessError> {
        let wanted = name.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|s| s.name() == wanted)
            .ok_or_else(|| HarnessError::UnknownScenario(name.to_string()))
    }

    /// Drive the scenario against `tracker`.
    pub fn run<H: RawHeap>(self, tracker: &mut AllocTracker<H>) -> Result<(), HarnessError> {
        match self {
            Self::Leak => leak(tracker),
            Self::DoubleFree => double_free(tracker),
            Self::Overrun => overrun(tracker),
            Self::Underrun => underrun(tracker),
            Self::Clean => clean(tracker),
            Self::Mixed => mixed(tracker),
        }
    }
}

/// Catalogue entry printed by `harness list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScenarioInfo {
    pub name: &'static str,
    pub description: &'static str,
}

fn fill(ptr: NonNull<u8>, len: usize, byte: u8) {
    // SAFETY: callers pass the user region of a live tracked block of `len` bytes.
    unsafe { std::ptr::write_bytes(ptr.as_ptr(), byte, len) };
}

/// Write one byte just past the user region.
fn poke_over<H: RawHeap>(tracker: &AllocTracker<H>, ptr: NonNull<u8>, size: usize) {
    if tracker.config().guards.enabled() {
        // SAFETY: with guards on, `ptr + size` is the first byte of the over
        // guard word, still inside the live block.
        unsafe { ptr.as_ptr().add(size).write(0xFF) };
    }
}

/// Write one byte just before the user region.
fn poke_under<H: RawHeap>(tracker: &AllocTracker<H>, ptr: NonNull<u8>) {
    if tracker.config().guards.enabled() {
        // SAFETY: with guards on, `ptr - 1` is the last byte of the under
        // guard word, still inside the live block.
        unsafe { ptr.as_ptr().sub(1).write(0x00) };
    }
}

fn leak<H: RawHeap>(t: &mut AllocTracker<H>) -> Result<(), HarnessError> {
    let p = t.allocate(16, "leak.c", 10)?;
    fill(p, 16, b'A');
    Ok(())
}

fn double_free<H: RawHeap>(t: &mut AllocTracker<H>) -> Result<(), HarnessError> {
    let p = t.allocate(8, "double_free.c", 4)?;
    fill(p, 8, b'B');
    t.deallocate(p.as_ptr(), "double_free.c", 7)?;
    t.deallocate(p.as_ptr(), "double_free.c", 9)?;
    Ok(())
}

fn overrun<H: RawHeap>(t: &mut AllocTracker<H>) -> Result<(), HarnessError> {
    let name = t.allocate(4, "overrun.c", 5)?;
    fill(name, 4, b'C');
    poke_over(t, name, 4);
    t.deallocate(name.as_ptr(), "overrun.c", 8)?;

    let other = t.allocate(12, "overrun.c", 11)?;
    t.deallocate(other.as_ptr(), "overrun.c", 12)?;
    Ok(())
}

fn underrun<H: RawHeap>(t: &mut AllocTracker<H>) -> Result<(), HarnessError> {
    let p = t.allocate(12, "underrun.c", 6)?;
    poke_under(t, p);
    t.deallocate(p.as_ptr(), "underrun.c", 9)?;
    Ok(())
}

fn clean<H: RawHeap>(t: &mut AllocTracker<H>) -> Result<(), HarnessError> {
    let mut blocks = Vec::new();
    for (i, size) in [1usize, 32, 0, 100].into_iter().enumerate() {
        let p = t.allocate(size, "clean.c", 20 + i as u32)?;
        fill(p, size, b'D');
        blocks.push(p);
    }
    let obj = t.allocate_as(AllocKind::New, 48, "clean.cpp", 7)?;
    for (i, p) in blocks.into_iter().rev().enumerate() {
        t.deallocate(p.as_ptr(), "clean.c", 30 + i as u32)?;
    }
    t.deallocate_as(AllocKind::New, obj.as_ptr(), "clean.cpp", 9)?;
    Ok(())
}

fn mixed<H: RawHeap>(t: &mut AllocTracker<H>) -> Result<(), HarnessError> {
    let table = t.allocate(64, "mixed.c", 12)?;
    let name = t.allocate(6, "mixed.c", 13)?;
    let header = t.allocate(24, "mixed.c", 14)?;
    let _node = t.allocate_as(AllocKind::New, 40, "mixed.cpp", 30)?;
    let scratch = t.allocate_as(AllocKind::New, 16, "mixed.cpp", 31)?;

    fill(name, 6, b'E');
    poke_over(t, name, 6);
    poke_under(t, header);

    t.deallocate(name.as_ptr(), "mixed.c", 40)?;
    t.deallocate(table.as_ptr(), "mixed.c", 41)?;
    t.deallocate(table.as_ptr(), "mixed.c", 42)?;
    t.deallocate_as(AllocKind::New, scratch.as_ptr(), "mixed.cpp", 50)?;
    // `header` and `_node` leak; the header underrun is caught by the sweep.
    Ok(())
}
