//! Call-site substitution macros.
//!
//! Each macro captures `file!()` (directory stripped) and `line!()` and routes
//! through [`global_tracker`](crate::global_tracker).

/// Tracked `malloc`: `track_alloc!(size)` -> `Result<NonNull<u8>, TrackError>`.
#[macro_export]
macro_rules! track_alloc {
    ($size:expr) => {
        $crate::global_tracker().allocate(
            $size,
            $crate::origin::basename(::core::file!()),
            ::core::line!(),
        )
    };
}

/// Tracked `free`: `track_free!(ptr)` for any raw pointer.
#[macro_export]
macro_rules! track_free {
    ($ptr:expr) => {
        $crate::global_tracker().deallocate(
            ($ptr) as *mut u8,
            $crate::origin::basename(::core::file!()),
            ::core::line!(),
        )
    };
}

/// Tracked `new`-family allocation.
#[macro_export]
macro_rules! track_new {
    ($size:expr) => {
        $crate::global_tracker().allocate_as(
            $crate::AllocKind::New,
            $size,
            $crate::origin::basename(::core::file!()),
            ::core::line!(),
        )
    };
}

/// Tracked `delete`-family release.
#[macro_export]
macro_rules! track_delete {
    ($ptr:expr) => {
        $crate::global_tracker().deallocate_as(
            $crate::AllocKind::New,
            ($ptr) as *mut u8,
            $crate::origin::basename(::core::file!()),
            ::core::line!(),
        )
    };
}

/// Write the global ledger report to `out`.
#[macro_export]
macro_rules! track_report {
    ($out:expr) => {
        $crate::global_tracker().report($out)
    };
}
