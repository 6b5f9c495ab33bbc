//! End-of-run ledger report.
//!
//! [`LedgerReport::collect`] reads an already-swept [`RecordStore`] and sorts
//! its records into four sections, always in this order and each in
//! allocation order: unfreed memory, double frees, underruns, overruns. The
//! same ledger state always renders to the same bytes.

use std::fmt;
use std::io::{self, Write};

use serde::Serialize;

use crate::guard::{over_guard_addr, under_guard_addr};
use crate::metrics::MetricsSnapshot;
use crate::origin::Origin;
use crate::store::RecordStore;

const BANNER: &str = "=========================================================";

/// How addresses are printed in the plain report.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AddressStyle {
    /// `0x7f3a...` as handed out by the heap.
    #[default]
    Raw,
    /// `<alloc #N>` handles with guard offsets, stable across runs.
    Redacted,
}

/// Kind of problem a report line describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Finding {
    Unfreed,
    DoubleFree,
    Underrun,
    Overrun,
}

impl Finding {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unfreed => "UNFREED MEMORY:",
            Self::DoubleFree => "DOUBLE FREE:",
            Self::Underrun => "BUFFER UNDERRUN:",
            Self::Overrun => "BUFFER OVERRUN:",
        }
    }
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub finding: Finding,
    /// Sequence number of the allocation this entry is about.
    pub seq: u64,
    /// Address the finding refers to: the user pointer for leaks and double
    /// frees, the damaged guard word for underruns and overruns.
    #[serde(serialize_with = "crate::serde_addr::serialize")]
    pub address: usize,
    /// Signed distance of `address` from the user pointer.
    pub offset: isize,
    pub size: usize,
    /// Call site responsible: the second free for double frees, the
    /// allocation for everything else.
    pub origin: Origin,
    /// Allocation site, when `origin` is not already it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocated_at: Option<Origin>,
}

impl ReportEntry {
    fn render_address(&self, style: AddressStyle) -> String {
        match style {
            AddressStyle::Raw => format!("{:#x}", self.address),
            AddressStyle::Redacted if self.offset == 0 => format!("<alloc #{}>", self.seq),
            AddressStyle::Redacted => format!("<alloc #{}>{:+}", self.seq, self.offset),
        }
    }

    fn write_plain<W: Write + ?Sized>(&self, out: &mut W, style: AddressStyle) -> io::Result<()> {
        write!(
            out,
            "{:<18}{} : {}",
            self.finding.label(),
            self.render_address(style),
            self.origin
        )?;
        match (self.finding, self.allocated_at) {
            (Finding::Unfreed, _) => writeln!(out, " ({} bytes)", self.size),
            (_, Some(at)) => writeln!(out, " (allocated at {at})"),
            (_, None) => writeln!(out),
        }
    }
}

/// Aggregate counters printed at the top of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportTotals {
    pub allocations: u64,
    pub deallocations: u64,
    /// Bytes requested over the whole run, freed allocations included.
    pub total_size: u64,
    pub news: u64,
    pub deletes: u64,
    pub failed_allocations: u64,
    pub unknown_frees: u64,
}

/// Swept ledger, ready to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerReport {
    pub totals: ReportTotals,
    pub unfreed: Vec<ReportEntry>,
    pub double_frees: Vec<ReportEntry>,
    pub underruns: Vec<ReportEntry>,
    pub overruns: Vec<ReportEntry>,
}

impl LedgerReport {
    /// Build the report from a store whose guards have already been swept.
    #[must_use]
    pub fn collect(store: &RecordStore, metrics: MetricsSnapshot) -> Self {
        let mut unfreed = Vec::new();
        let mut double_frees = Vec::new();
        let mut underruns = Vec::new();
        let mut overruns = Vec::new();

        for r in store {
            let entry = |finding, address: usize, origin, allocated_at| ReportEntry {
                finding,
                seq: r.seq,
                address,
                offset: address.wrapping_sub(r.address) as isize,
                size: r.size,
                origin,
                allocated_at,
            };
            if !r.is_freed() {
                unfreed.push(entry(Finding::Unfreed, r.address, r.origin, None));
            }
            if let Some(second) = r.double_free_origin() {
                double_frees.push(entry(
                    Finding::DoubleFree,
                    r.address,
                    second,
                    Some(r.origin),
                ));
            }
            if r.underran() {
                underruns.push(entry(
                    Finding::Underrun,
                    under_guard_addr(r.address),
                    r.origin,
                    None,
                ));
            }
            if r.overran() {
                overruns.push(entry(
                    Finding::Overrun,
                    over_guard_addr(r.address, r.size),
                    r.origin,
                    None,
                ));
            }
        }

        Self {
            totals: ReportTotals {
                allocations: metrics.allocations(),
                deallocations: metrics.deallocations(),
                total_size: store.total_requested(),
                news: metrics.news,
                deletes: metrics.deletes,
                failed_allocations: metrics.failed_allocations,
                unknown_frees: metrics.unknown_frees,
            },
            unfreed,
            double_frees,
            underruns,
            overruns,
        }
    }

    /// All findings in report order.
    pub fn entries(&self) -> impl Iterator<Item = &ReportEntry> {
        self.unfreed
            .iter()
            .chain(&self.double_frees)
            .chain(&self.underruns)
            .chain(&self.overruns)
    }

    /// True when nothing leaked, nothing was freed twice and no guard broke.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.entries().next().is_none()
    }

    /// Write the framed plain-text report.
    pub fn write_plain<W: Write + ?Sized>(&self, out: &mut W, style: AddressStyle) -> io::Result<()> {
        let t = &self.totals;
        writeln!(out, "{BANNER}")?;
        writeln!(out, "                  ALLOCATION LEDGER")?;
        writeln!(out, "{BANNER}")?;
        writeln!(out, "Total Allocations:   {}", t.allocations)?;
        writeln!(out, "Total Deallocations: {}", t.deallocations)?;
        if t.news > 0 || t.deletes > 0 {
            writeln!(out, "Total News:          {}", t.news)?;
            writeln!(out, "Total Deletes:       {}", t.deletes)?;
        }
        writeln!(out, "Total Size:          {} bytes", t.total_size)?;
        if t.failed_allocations > 0 {
            writeln!(out, "Failed Allocations:  {}", t.failed_allocations)?;
        }
        if t.unknown_frees > 0 {
            writeln!(out, "Untracked Frees:     {}", t.unknown_frees)?;
        }

        if !self.is_clean() {
            writeln!(out)?;
            for entry in self.entries() {
                entry.write_plain(out, style)?;
            }
        }

        writeln!(out, "{BANNER}")?;
        writeln!(out, "                    END OF LEDGER")?;
        writeln!(out, "{BANNER}")
    }

    /// Plain-text report as a string.
    #[must_use]
    pub fn to_plain(&self, style: AddressStyle) -> String {
        let mut buf = Vec::new();
        self.write_plain(&mut buf, style)
            .expect("writing to Vec should not fail");
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for LedgerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_plain(AddressStyle::Raw))
    }
}
