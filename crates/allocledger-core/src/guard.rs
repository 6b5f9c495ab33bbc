//! Guard words around tracked allocations.
//!
//! A guarded allocation of `n` bytes asks the heap for `n + 2 * GUARD_WIDTH`
//! bytes and lays them out as:
//!
//! ```text
//! base            base + W                base + W + n
//! |  UNDER_MAGIC  |  user region (n bytes) |  OVER_MAGIC  |
//! ```
//!
//! The caller only ever sees `base + W`. Both words are written once when the
//! allocation is made and compared against the constants when it is freed and
//! when the ledger is reported. Words are accessed unaligned because the over
//! guard follows an arbitrary user size.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use crate::record::AllocationRecord;

/// Width of each guard word in bytes.
pub const GUARD_WIDTH: usize = 8;

/// Bytes added to every guarded allocation (under + over word).
pub const GUARD_OVERHEAD: usize = 2 * GUARD_WIDTH;

/// Pattern written immediately before the user region.
pub const UNDER_MAGIC: u64 = 0xBAAD_F00D_BAAD_F00D;

/// Pattern written immediately after the user region.
pub const OVER_MAGIC: u64 = 0xDEAD_BEEF_FEED_FACE;

/// Heap request size for a user request of `size` bytes.
///
/// Returns `None` when the padded size does not fit in `usize`.
#[must_use]
pub fn padded_size(size: usize, guarded: bool) -> Option<usize> {
    if guarded {
        size.checked_add(GUARD_OVERHEAD)
    } else {
        // malloc(0) may legally return null, which would read as failure.
        Some(size.max(1))
    }
}

/// Address of the under guard word for a guarded user address.
#[must_use]
pub const fn under_guard_addr(user_addr: usize) -> usize {
    user_addr.wrapping_sub(GUARD_WIDTH)
}

/// Address of the over guard word for a guarded user address.
#[must_use]
pub const fn over_guard_addr(user_addr: usize, size: usize) -> usize {
    user_addr.wrapping_add(size)
}

/// Outcome of comparing both guard words against their constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardCheck {
    pub under_intact: bool,
    pub over_intact: bool,
}

impl GuardCheck {
    /// Both words intact (also the answer for unguarded allocations).
    pub const INTACT: Self = Self {
        under_intact: true,
        over_intact: true,
    };

    #[must_use]
    pub const fn is_intact(self) -> bool {
        self.under_intact && self.over_intact
    }

    #[must_use]
    pub const fn overran(self) -> bool {
        !self.over_intact
    }

    #[must_use]
    pub const fn underran(self) -> bool {
        !self.under_intact
    }
}

/// One heap block together with the user region carved out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddedAllocation {
    base: NonNull<u8>,
    size: usize,
    guarded: bool,
}

impl PaddedAllocation {
    /// Wrap a block freshly returned by the heap.
    #[must_use]
    pub fn from_base(base: NonNull<u8>, size: usize, guarded: bool) -> Self {
        Self {
            base,
            size,
            guarded,
        }
    }

    /// Reconstruct the block from the address that was handed to the caller.
    ///
    /// Returns `None` if `user_addr` cannot have come from a guarded block
    /// (the base would be null or wrap around).
    #[must_use]
    pub fn from_user(user_addr: usize, size: usize, guarded: bool) -> Option<Self> {
        let base_addr = if guarded {
            user_addr.checked_sub(GUARD_WIDTH)?
        } else {
            user_addr
        };
        let base = NonNull::new(base_addr as *mut u8)?;
        Some(Self {
            base,
            size,
            guarded,
        })
    }

    /// Start of the underlying heap block.
    #[must_use]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Requested user size.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_guarded(&self) -> bool {
        self.guarded
    }

    /// Pointer handed to the caller.
    #[must_use]
    pub fn user_region(&self) -> NonNull<u8> {
        if !self.guarded {
            return self.base;
        }
        // SAFETY: the block is at least GUARD_OVERHEAD bytes, so base + W is in
        // bounds and cannot be null.
        unsafe { self.base.add(GUARD_WIDTH) }
    }

    /// Location of the under guard word, if this block is guarded.
    #[must_use]
    pub fn under_guard(&self) -> Option<*mut u8> {
        self.guarded.then(|| self.base.as_ptr())
    }

    /// Location of the over guard word, if this block is guarded.
    #[must_use]
    pub fn over_guard(&self) -> Option<*mut u8> {
        self.guarded
            .then(|| self.base.as_ptr().wrapping_add(GUARD_WIDTH + self.size))
    }

    /// Write both guard words.
    ///
    /// # Safety
    ///
    /// The block must be live and at least `padded_size(size, true)` bytes.
    pub unsafe fn arm(&self) {
        if let (Some(under), Some(over)) = (self.under_guard(), self.over_guard()) {
            // SAFETY: both words lie inside the block per the caller contract.
            unsafe {
                under.cast::<u64>().write_unaligned(UNDER_MAGIC);
                over.cast::<u64>().write_unaligned(OVER_MAGIC);
            }
        }
    }

    /// Compare both guard words against their constants.
    ///
    /// # Safety
    ///
    /// The block must still be live (not yet returned to the heap).
    #[must_use]
    pub unsafe fn inspect(&self) -> GuardCheck {
        let (Some(under), Some(over)) = (self.under_guard(), self.over_guard()) else {
            return GuardCheck::INTACT;
        };
        // SAFETY: both words lie inside the live block per the caller contract.
        let (under_word, over_word) = unsafe {
            (
                under.cast::<u64>().read_unaligned(),
                over.cast::<u64>().read_unaligned(),
            )
        };
        GuardCheck {
            under_intact: under_word == UNDER_MAGIC,
            over_intact: over_word == OVER_MAGIC,
        }
    }
}

/// Check a record's guard words and set its corruption bits on mismatch.
///
/// Repeated calls only ever add bits; a record whose words were already
/// reported keeps its flags even if the bytes are later restored.
///
/// # Safety
///
/// The record's block must still be live.
pub unsafe fn verify(record: &mut AllocationRecord) -> GuardCheck {
    if !record.guarded {
        return GuardCheck::INTACT;
    }
    let Some(block) = PaddedAllocation::from_user(record.address, record.size, true) else {
        return GuardCheck::INTACT;
    };
    // SAFETY: forwarded from the caller.
    let check = unsafe { block.inspect() };
    record.mark_corruption(check.overran(), check.underran());
    check
}
