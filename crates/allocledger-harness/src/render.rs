//! Scenario execution and report rendering.

use allocledger_core::{
    AddressStyle, AllocTracker, LedgerReport, RawHeap, SystemHeap, TraceEmitter, TrackerConfig,
};

use crate::error::HarnessError;
use crate::scenarios::Scenario;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Result<Self, HarnessError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            _ => Err(HarnessError::UnknownFormat(name.to_string())),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub format: OutputFormat,
    pub style: AddressStyle,
    pub digest: bool,
}

/// Outcome of one scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub scenario: Scenario,
    pub report: LedgerReport,
    /// Report rendered per [`RunOptions`].
    pub rendered: String,
    /// Lowercase hex SHA-256 of `rendered`, when requested.
    pub digest: Option<String>,
}

/// Render a swept report in the requested format.
pub fn render_report(
    report: &LedgerReport,
    format: OutputFormat,
    style: AddressStyle,
) -> Result<String, HarnessError> {
    match format {
        OutputFormat::Plain => {
            let mut buf = Vec::new();
            report.write_plain(&mut buf, style)?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        }
        OutputFormat::Json => {
            let mut json = report.to_json()?;
            json.push('\n');
            Ok(json)
        }
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(&mut out, "{b:02x}").expect("writing to String should not fail");
    }
    out
}

/// Lowercase hex SHA-256 of `text`.
#[must_use]
pub fn sha256_hex(text: &str) -> String {
    use sha2::Digest;
    hex_lower(&sha2::Sha256::digest(text.as_bytes()))
}

/// Run `scenario` on `tracker` and render what it left in the ledger.
pub fn run_on<H: RawHeap>(
    scenario: Scenario,
    tracker: &mut AllocTracker<H>,
    opts: RunOptions,
) -> Result<ScenarioRun, HarnessError> {
    scenario.run(tracker)?;
    let report = tracker.snapshot();
    let rendered = render_report(&report, opts.format, opts.style)?;
    let digest = opts.digest.then(|| sha256_hex(&rendered));
    Ok(ScenarioRun {
        scenario,
        report,
        rendered,
        digest,
    })
}

/// Run `scenario` on a fresh system-heap tracker, tracing to stderr.
pub fn run_scenario(
    scenario: Scenario,
    config: TrackerConfig,
    opts: RunOptions,
) -> Result<ScenarioRun, HarnessError> {
    let mut tracker: AllocTracker<SystemHeap> =
        AllocTracker::new(config).with_tracer(TraceEmitter::to_stderr(config.trace));
    run_on(scenario, &mut tracker, opts)
}
