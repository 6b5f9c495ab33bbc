//! Allocation ledger with guard-word corruption detection.
//!
//! Every allocation made through an [`AllocTracker`] is forwarded to the real
//! heap, padded with a guard word on each side, and appended to a permanent
//! ledger together with its call site. Deallocations are matched against the
//! ledger, which lets the tracker detect double frees and damaged guard words.
//! At the end of a run the ledger renders as a report of unfreed memory,
//! double frees, underruns and overruns.
//!
//! # Architecture
//!
//! - **Records** (`record`): per-allocation metadata and status bits
//! - **Record store** (`store`): insertion-ordered ledger, looked up by address
//! - **Guards** (`guard`): padded layout, arming and verification of guard words
//! - **Heap** (`heap`): the real allocator behind the ledger
//! - **Tracker** (`tracker`): tracked allocate / deallocate
//! - **Report** (`report`): swept ledger as plain text or JSON
//! - **Configuration** (`config`): trace and guard switches from the environment
//! - **Tracing** (`trace`): per-call events, text blocks or JSONL
//! - **Metrics** (`metrics`): atomic counters
//! - **Shared** (`shared`): mutex wrapper and the process-wide tracker
//!
//! ```no_run
//! use allocledger_core::{AllocTracker, TrackerConfig};
//!
//! let mut tracker = AllocTracker::new(TrackerConfig::default());
//! let p = tracker.allocate(16, "main.rs", 3).expect("allocation");
//! tracker.deallocate(p.as_ptr(), "main.rs", 4).expect("tracked pointer");
//! tracker.report(&mut std::io::stdout()).expect("stdout");
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod guard;
pub mod heap;
mod macros;
pub mod metrics;
pub mod origin;
pub mod record;
pub mod report;
mod serde_addr;
pub mod shared;
pub mod store;
pub mod trace;
pub mod tracker;

pub use config::{GuardMode, TraceMode, TrackerConfig, global_config};
pub use error::TrackError;
pub use heap::{RawHeap, SystemHeap};
pub use metrics::{LedgerMetrics, MetricsSnapshot};
pub use origin::Origin;
pub use record::{AllocKind, AllocationRecord, RecordStatus};
pub use report::{AddressStyle, Finding, LedgerReport, ReportEntry};
pub use shared::{SharedTracker, global_tracker};
pub use store::RecordStore;
pub use trace::{TraceBuffer, TraceEmitter, TraceEvent};
pub use tracker::{AllocTracker, FreeOutcome};
