//! Failures surfaced to callers of the tracker.

use thiserror::Error;

use crate::origin::Origin;

/// Conditions the tracker reports as errors instead of recording them.
///
/// Double frees and guard corruption are not errors: they are recorded in the
/// ledger and returned as a [`FreeOutcome`](crate::FreeOutcome).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrackError {
    /// The heap returned no memory, or the padded size overflowed.
    /// Nothing was recorded.
    #[error("allocation of {size} bytes failed at {origin}")]
    AllocationFailure { size: usize, origin: Origin },
    /// Deallocation of an address the ledger has never handed out. The
    /// tracker leaves both the heap and the ledger untouched.
    #[error("deallocation of untracked pointer {address:#x} at {origin}")]
    UnknownPointer { address: usize, origin: Origin },
}
