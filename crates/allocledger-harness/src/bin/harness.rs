//! CLI entrypoint for the allocledger scenario harness.

use allocledger_core::{AddressStyle, GuardMode, TraceMode, global_config};
use allocledger_harness::{OutputFormat, RunOptions, Scenario, run_scenario};
use clap::{Parser, Subcommand};

/// Run instrumented scenarios and print their allocation ledgers.
#[derive(Debug, Parser)]
#[command(name = "allocledger-harness")]
#[command(about = "Scenario harness for the allocation ledger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the built-in scenarios.
    List {
        /// Print the catalogue as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run one scenario on a fresh tracker and print its report.
    Run {
        /// Scenario name (see `list`).
        scenario: String,
        /// Output format: `plain` (default) or `json`.
        #[arg(long, default_value = "plain")]
        format: String,
        /// Guard words: `on` or `off` (overrides ALLOCLEDGER_GUARDS).
        #[arg(long)]
        guards: Option<String>,
        /// Per-call tracing to stderr: `off`, `text` or `json` (overrides ALLOCLEDGER_TRACE).
        #[arg(long)]
        trace: Option<String>,
        /// Print `<alloc #N>` handles instead of raw addresses.
        #[arg(long)]
        redact: bool,
        /// Append the SHA-256 of the rendered report.
        #[arg(long)]
        digest: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::List { json } => {
            if json {
                let catalogue: Vec<_> = Scenario::ALL.iter().map(|s| s.info()).collect();
                println!("{}", serde_json::to_string_pretty(&catalogue)?);
            } else {
                for s in Scenario::ALL {
                    println!("{:<12} {}", s.name(), s.description());
                }
            }
        }
        Command::Run {
            scenario,
            format,
            guards,
            trace,
            redact,
            digest,
        } => {
            let scenario = Scenario::from_name(&scenario)?;
            let mut config = global_config();
            if let Some(g) = guards.as_deref() {
                config = config.with_guards(GuardMode::from_str_loose(g));
            }
            if let Some(t) = trace.as_deref() {
                config = config.with_trace(TraceMode::from_str_loose(t));
            }
            let opts = RunOptions {
                format: OutputFormat::from_name(&format)?,
                style: if redact {
                    AddressStyle::Redacted
                } else {
                    AddressStyle::Raw
                },
                digest,
            };

            let run = run_scenario(scenario, config, opts)?;
            print!("{}", run.rendered);
            if let Some(hex) = run.digest {
                println!("sha256:{hex}");
            }
        }
    }

    Ok(())
}
