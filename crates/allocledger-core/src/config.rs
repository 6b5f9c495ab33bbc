//! Tracker configuration.
//!
//! Two switches, both readable from the environment:
//! - `ALLOCLEDGER_TRACE`: per-call tracing. `off` (default), `text` for the
//!   classic multi-line blocks, `json` for one JSON object per line.
//! - `ALLOCLEDGER_GUARDS`: `on` (default) surrounds every allocation with guard
//!   words; `off` tracks allocations without padding them.

use std::sync::OnceLock;

use serde::Serialize;

/// Env var selecting the trace format.
pub const TRACE_ENV: &str = "ALLOCLEDGER_TRACE";

/// Env var toggling guard words.
pub const GUARDS_ENV: &str = "ALLOCLEDGER_GUARDS";

/// Per-call tracing format.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    /// No per-call output.
    #[default]
    Off,
    /// Human-readable blocks.
    Text,
    /// JSONL events.
    Json,
}

impl TraceMode {
    /// Parse from string (case-insensitive). Unknown values disable tracing.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" | "on" | "1" | "verbose" => Self::Text,
            "json" | "jsonl" => Self::Json,
            _ => Self::Off,
        }
    }

    #[must_use]
    pub const fn enabled(self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Whether allocations carry guard words.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardMode {
    #[default]
    On,
    /// Plain pass-through tracking: no padding, no corruption detection.
    Off,
}

impl GuardMode {
    /// Parse from string (case-insensitive). Unknown values keep guards on.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "0" | "false" | "passthrough" | "disabled" => Self::Off,
            _ => Self::On,
        }
    }

    #[must_use]
    pub const fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Settings an [`AllocTracker`](crate::AllocTracker) is built with.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackerConfig {
    pub trace: TraceMode,
    pub guards: GuardMode,
}

impl TrackerConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            trace: TraceMode::Off,
            guards: GuardMode::On,
        }
    }

    #[must_use]
    pub const fn with_trace(mut self, trace: TraceMode) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub const fn with_guards(mut self, guards: GuardMode) -> Self {
        self.guards = guards;
        self
    }

    /// Read both switches from the environment, defaulting when unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let trace = lookup(TRACE_ENV)
            .map(|v| TraceMode::from_str_loose(&v))
            .unwrap_or_default();
        let guards = lookup(GUARDS_ENV)
            .map(|v| GuardMode::from_str_loose(&v))
            .unwrap_or_default();
        Self { trace, guards }
    }
}

static GLOBAL_CONFIG: OnceLock<TrackerConfig> = OnceLock::new();

/// Process-wide configuration (reads the environment on first call).
#[must_use]
pub fn global_config() -> TrackerConfig {
    *GLOBAL_CONFIG.get_or_init(TrackerConfig::from_env)
}
