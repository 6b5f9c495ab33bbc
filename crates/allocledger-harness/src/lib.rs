//! Scenario harness for the allocation ledger.
//!
//! This crate provides:
//! - Built-in scenarios that exercise leaks, double frees and guard damage
//! - Report rendering (plain or JSON, raw or redacted addresses)
//! - SHA-256 digests of rendered reports for golden comparisons

pub mod error;
pub mod render;
pub mod scenarios;

pub use error::HarnessError;
pub use render::{OutputFormat, RunOptions, ScenarioRun, run_scenario};
pub use scenarios::{Scenario, ScenarioInfo};
