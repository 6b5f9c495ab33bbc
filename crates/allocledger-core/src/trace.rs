//! Per-call trace events.
//!
//! When tracing is enabled the tracker emits one event per allocate/free. Two
//! renderings exist:
//! - text: the classic framed block (`MALLOC:`, `at address:`, `in file:`, ...)
//! - json: one JSON object per line, `{"trace_seq":..,"level":..,"event":..}`
//!
//! Emission is best-effort. A failing writer never disturbs the allocation
//! path; write errors are dropped.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::TraceMode;
use crate::origin::Origin;
use crate::record::AllocKind;

const RULE: &str = "-------------------------------------";

/// Severity of a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    Info,
    Warn,
    Error,
}

/// Something the tracker observed during one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    Allocated {
        seq: u64,
        kind: AllocKind,
        #[serde(serialize_with = "crate::serde_addr::serialize")]
        address: usize,
        size: usize,
        origin: Origin,
        /// Live allocations after this call.
        live: u64,
    },
    AllocationFailed {
        kind: AllocKind,
        size: usize,
        origin: Origin,
    },
    Freed {
        seq: u64,
        kind: AllocKind,
        #[serde(serialize_with = "crate::serde_addr::serialize")]
        address: usize,
        size: usize,
        origin: Origin,
        live: u64,
    },
    DoubleFree {
        seq: u64,
        #[serde(serialize_with = "crate::serde_addr::serialize")]
        address: usize,
        origin: Origin,
        allocated_at: Origin,
    },
    GuardViolation {
        seq: u64,
        #[serde(serialize_with = "crate::serde_addr::serialize")]
        address: usize,
        overran: bool,
        underran: bool,
        allocated_at: Origin,
    },
    UnknownPointer {
        #[serde(serialize_with = "crate::serde_addr::serialize")]
        address: usize,
        origin: Origin,
    },
}

impl TraceEvent {
    #[must_use]
    pub fn level(&self) -> TraceLevel {
        match self {
            Self::Allocated { .. } | Self::Freed { .. } => TraceLevel::Info,
            Self::AllocationFailed { .. } | Self::UnknownPointer { .. } => TraceLevel::Warn,
            Self::DoubleFree { .. } | Self::GuardViolation { .. } => TraceLevel::Error,
        }
    }

    fn write_text(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{RULE}")?;
        match self {
            Self::Allocated {
                kind,
                address,
                size,
                origin,
                live,
                ..
            } => {
                writeln!(w, "{:<12}{size} bytes", format!("{}:", kind.alloc_label()))?;
                writeln!(w, "at address: {address:#x}")?;
                writeln!(w, "in file:    {}", origin.file)?;
                writeln!(w, "on line:    {}", origin.line)?;
                writeln!(w, "count:      {live}")?;
            }
            Self::AllocationFailed { size, origin, .. } => {
                writeln!(w, "FAILED:     {size} bytes")?;
                writeln!(w, "in file:    {}", origin.file)?;
                writeln!(w, "on line:    {}", origin.line)?;
            }
            Self::Freed {
                kind,
                address,
                origin,
                live,
                ..
            } => {
                writeln!(w, "{:<12}{address:#x}", format!("{}:", kind.free_label()))?;
                writeln!(w, "at file:    {}", origin.file)?;
                writeln!(w, "on line:    {}", origin.line)?;
                writeln!(w, "count:      {live}")?;
            }
            Self::DoubleFree {
                address,
                origin,
                allocated_at,
                ..
            } => {
                writeln!(w, "DOUBLE FREE: {address:#x}")?;
                writeln!(w, "at file:    {}", origin.file)?;
                writeln!(w, "on line:    {}", origin.line)?;
                writeln!(w, "allocated:  {allocated_at}")?;
            }
            Self::GuardViolation {
                address,
                overran,
                underran,
                allocated_at,
                ..
            } => {
                let what = match (*overran, *underran) {
                    (true, true) => "OVERRUN+UNDERRUN",
                    (true, false) => "OVERRUN",
                    _ => "UNDERRUN",
                };
                writeln!(w, "{what}: {address:#x}")?;
                writeln!(w, "allocated:  {allocated_at}")?;
            }
            Self::UnknownPointer { address, origin } => {
                writeln!(w, "UNTRACKED:  {address:#x}")?;
                writeln!(w, "at file:    {}", origin.file)?;
                writeln!(w, "on line:    {}", origin.line)?;
            }
        }
        writeln!(w, "{RULE}")
    }
}

#[derive(Serialize)]
struct TraceLine<'a> {
    trace_seq: u64,
    level: TraceLevel,
    #[serde(flatten)]
    event: &'a TraceEvent,
}

/// In-memory sink shared between an emitter and a test.
#[derive(Debug, Clone, Default)]
pub struct TraceBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl TraceBuffer {
    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }
}

impl Write for TraceBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes trace events in the configured format.
pub struct TraceEmitter {
    writer: Box<dyn Write + Send>,
    mode: TraceMode,
    seq: u64,
}

impl std::fmt::Debug for TraceEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceEmitter")
            .field("mode", &self.mode)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl TraceEmitter {
    /// Emitter over any writer. `TraceMode::Off` yields a silent emitter.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>, mode: TraceMode) -> Self {
        Self {
            writer,
            mode,
            seq: 0,
        }
    }

    #[must_use]
    pub fn to_stdout(mode: TraceMode) -> Self {
        Self::new(Box::new(io::stdout()), mode)
    }

    #[must_use]
    pub fn to_stderr(mode: TraceMode) -> Self {
        Self::new(Box::new(io::stderr()), mode)
    }

    /// Emitter writing into a buffer the caller can read back (for testing).
    #[must_use]
    pub fn to_buffer(mode: TraceMode) -> (Self, TraceBuffer) {
        let buffer = TraceBuffer::default();
        (Self::new(Box::new(buffer.clone()), mode), buffer)
    }

    #[must_use]
    pub fn mode(&self) -> TraceMode {
        self.mode
    }

    /// Number of events emitted so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.seq
    }

    /// Emit one event. Write failures are ignored.
    pub fn emit(&mut self, event: &TraceEvent) {
        if !self.mode.enabled() {
            return;
        }
        self.seq += 1;
        let _ = self.write_event(event);
    }

    fn write_event(&mut self, event: &TraceEvent) -> io::Result<()> {
        match self.mode {
            TraceMode::Off => Ok(()),
            TraceMode::Text => {
                event.write_text(&mut self.writer)?;
                self.writer.flush()
            }
            TraceMode::Json => {
                let line = TraceLine {
                    trace_seq: self.seq,
                    level: event.level(),
                    event,
                };
                let json = serde_json::to_string(&line).map_err(io::Error::other)?;
                writeln!(self.writer, "{json}")?;
                self.writer.flush()
            }
        }
    }
}
