//! Per-allocation ledger entries.

use bitflags::bitflags;
use serde::Serialize;

use crate::origin::Origin;

bitflags! {
    /// Independent facts recorded about an allocation.
    ///
    /// Bits are only ever set. `FREED` is the one bit that is also consulted
    /// to classify a later free as a double free.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RecordStatus: u8 {
        const FREED = 1 << 0;
        const DOUBLE_FREED = 1 << 1;
        const OVERRAN = 1 << 2;
        const UNDERRAN = 1 << 3;
    }
}

/// Which call family produced an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocKind {
    /// `malloc` / `free` style call sites.
    #[default]
    Malloc,
    /// `new` / `delete` style call sites.
    New,
}

impl AllocKind {
    /// Label used when tracing an allocation of this family.
    #[must_use]
    pub const fn alloc_label(self) -> &'static str {
        match self {
            Self::Malloc => "MALLOC",
            Self::New => "NEW",
        }
    }

    /// Label used when tracing a release of this family.
    #[must_use]
    pub const fn free_label(self) -> &'static str {
        match self {
            Self::Malloc => "FREED",
            Self::New => "DELETED",
        }
    }
}

/// Metadata for one successful allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    /// 1-based position of this allocation in the ledger.
    pub seq: u64,
    /// User-visible address handed back to the caller.
    pub address: usize,
    /// Requested size in bytes, excluding guard words.
    pub size: usize,
    pub origin: Origin,
    pub kind: AllocKind,
    /// Whether guard words surround the user region.
    pub guarded: bool,
    status: RecordStatus,
    double_free_origin: Option<Origin>,
}

impl AllocationRecord {
    #[must_use]
    pub fn new(
        seq: u64,
        address: usize,
        size: usize,
        origin: Origin,
        kind: AllocKind,
        guarded: bool,
    ) -> Self {
        Self {
            seq,
            address,
            size,
            origin,
            kind,
            guarded,
            status: RecordStatus::empty(),
            double_free_origin: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> RecordStatus {
        self.status
    }

    #[must_use]
    pub fn is_freed(&self) -> bool {
        self.status.contains(RecordStatus::FREED)
    }

    #[must_use]
    pub fn is_double_freed(&self) -> bool {
        self.status.contains(RecordStatus::DOUBLE_FREED)
    }

    #[must_use]
    pub fn overran(&self) -> bool {
        self.status.contains(RecordStatus::OVERRAN)
    }

    #[must_use]
    pub fn underran(&self) -> bool {
        self.status.contains(RecordStatus::UNDERRAN)
    }

    /// Origin of the second free, if one happened.
    #[must_use]
    pub fn double_free_origin(&self) -> Option<Origin> {
        self.double_free_origin
    }

    pub fn mark_freed(&mut self) {
        self.status.insert(RecordStatus::FREED);
    }

    /// Flag a repeated free. Only the first repeat's origin is kept.
    pub fn mark_double_freed(&mut self, origin: Origin) {
        if !self.is_double_freed() {
            self.double_free_origin = Some(origin);
        }
        self.status.insert(RecordStatus::DOUBLE_FREED);
    }

    /// Set the corruption bits. Returns true if any bit was newly set.
    pub fn mark_corruption(&mut self, overran: bool, underran: bool) -> bool {
        let before = self.status;
        if overran {
            self.status.insert(RecordStatus::OVERRAN);
        }
        if underran {
            self.status.insert(RecordStatus::UNDERRAN);
        }
        before != self.status
    }
}
