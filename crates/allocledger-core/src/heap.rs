//! The real allocator underneath the ledger.

#![allow(unsafe_code)]

use std::ptr::NonNull;

/// Backing allocator used by [`AllocTracker`](crate::AllocTracker).
///
/// # Safety
///
/// Implementations must return blocks that are valid for reads and writes of
/// at least `size` bytes, aligned to at least 8 bytes, and must accept every
/// such block back in [`RawHeap::release`] exactly once.
pub unsafe trait RawHeap {
    /// Allocate `size` bytes. `None` means the allocator is out of memory.
    fn acquire(&self, size: usize) -> Option<NonNull<u8>>;

    /// Return a block obtained from [`RawHeap::acquire`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `acquire` on this heap and must not have been
    /// released already.
    unsafe fn release(&self, ptr: NonNull<u8>);
}

/// Forwards to the C library's `malloc` / `free`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHeap;

// SAFETY: malloc returns blocks aligned for any fundamental type (>= 8 bytes
// on every supported target) and free accepts them back.
unsafe impl RawHeap for SystemHeap {
    fn acquire(&self, size: usize) -> Option<NonNull<u8>> {
        // SAFETY: malloc has no preconditions; a null return is handled below.
        let ptr = unsafe { libc::malloc(size) };
        NonNull::new(ptr.cast::<u8>())
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        // SAFETY: caller guarantees `ptr` came from malloc and is still live.
        unsafe { libc::free(ptr.as_ptr().cast::<libc::c_void>()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_heap_round_trip() {
        let heap = SystemHeap;
        let ptr = heap.acquire(64).expect("malloc(64)");
        assert_eq!(ptr.as_ptr() as usize % 8, 0);
        // SAFETY: block is 64 bytes and owned by this test.
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0x5A, 64);
            assert_eq!(*ptr.as_ptr().add(63), 0x5A);
            heap.release(ptr);
        }
    }
}
