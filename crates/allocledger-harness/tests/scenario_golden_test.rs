use allocledger_core::{AddressStyle, GuardMode, TrackerConfig};
use allocledger_harness::render::sha256_hex;
use allocledger_harness::{OutputFormat, RunOptions, Scenario, run_scenario};

const BANNER: &str = "=========================================================";

fn redacted(scenario: Scenario, config: TrackerConfig) -> String {
    let opts = RunOptions {
        style: AddressStyle::Redacted,
        ..RunOptions::default()
    };
    run_scenario(scenario, config, opts)
        .expect("scenario runs")
        .rendered
}

fn framed(body: &str) -> String {
    format!(
        "{BANNER}\n                  ALLOCATION LEDGER\n{BANNER}\n{body}{BANNER}\n                    END OF LEDGER\n{BANNER}\n"
    )
}

#[test]
fn leak_golden() {
    let expected = framed(
        "Total Allocations:   1
Total Deallocations: 0
Total Size:          16 bytes

UNFREED MEMORY:   <alloc #1> : leak.c:10 (16 bytes)
",
    );
    assert_eq!(redacted(Scenario::Leak, TrackerConfig::new()), expected);
}

#[test]
fn double_free_golden() {
    let expected = framed(
        "Total Allocations:   1
Total Deallocations: 1
Total Size:          8 bytes

DOUBLE FREE:      <alloc #1> : double_free.c:9 (allocated at double_free.c:4)
",
    );
    assert_eq!(redacted(Scenario::DoubleFree, TrackerConfig::new()), expected);
}

#[test]
fn overrun_golden() {
    let expected = framed(
        "Total Allocations:   2
Total Deallocations: 2
Total Size:          16 bytes

BUFFER OVERRUN:   <alloc #1>+4 : overrun.c:5
",
    );
    assert_eq!(redacted(Scenario::Overrun, TrackerConfig::new()), expected);
}

#[test]
fn underrun_golden() {
    let expected = framed(
        "Total Allocations:   1
Total Deallocations: 1
Total Size:          12 bytes

BUFFER UNDERRUN:  <alloc #1>-8 : underrun.c:6
",
    );
    assert_eq!(redacted(Scenario::Underrun, TrackerConfig::new()), expected);
}

#[test]
fn mixed_golden() {
    let expected = framed(
        "Total Allocations:   5
Total Deallocations: 3
Total News:          2
Total Deletes:       1
Total Size:          150 bytes

UNFREED MEMORY:   <alloc #3> : mixed.c:14 (24 bytes)
UNFREED MEMORY:   <alloc #4> : mixed.cpp:30 (40 bytes)
DOUBLE FREE:      <alloc #1> : mixed.c:42 (allocated at mixed.c:12)
BUFFER UNDERRUN:  <alloc #3>-8 : mixed.c:14
BUFFER OVERRUN:   <alloc #2>+6 : mixed.c:13
",
    );
    assert_eq!(redacted(Scenario::Mixed, TrackerConfig::new()), expected);
}

#[test]
fn clean_golden_has_no_findings() {
    let text = redacted(Scenario::Clean, TrackerConfig::new());
    let expected = framed(
        "Total Allocations:   5
Total Deallocations: 5
Total News:          1
Total Deletes:       1
Total Size:          181 bytes
",
    );
    assert_eq!(text, expected);
}

#[test]
fn guards_off_drops_corruption_sections() {
    let cfg = TrackerConfig::new().with_guards(GuardMode::Off);
    let text = redacted(Scenario::Mixed, cfg);
    assert!(text.contains("UNFREED MEMORY:   <alloc #3> : mixed.c:14 (24 bytes)"));
    assert!(text.contains("DOUBLE FREE:      <alloc #1> : mixed.c:42"));
    assert!(!text.contains("BUFFER"));
}

#[test]
fn redacted_digest_is_stable_across_runs() {
    let opts = RunOptions {
        style: AddressStyle::Redacted,
        digest: true,
        ..RunOptions::default()
    };
    let first = run_scenario(Scenario::Mixed, TrackerConfig::new(), opts).expect("run");
    let second = run_scenario(Scenario::Mixed, TrackerConfig::new(), opts).expect("run");
    assert_eq!(first.digest, second.digest);
    assert_eq!(first.digest, Some(sha256_hex(&first.rendered)));
}

#[test]
fn json_output_parses_with_sections() {
    let opts = RunOptions {
        format: OutputFormat::Json,
        ..RunOptions::default()
    };
    let run = run_scenario(Scenario::Mixed, TrackerConfig::new(), opts).expect("run");
    let v: serde_json::Value = serde_json::from_str(&run.rendered).expect("json");
    assert_eq!(v["totals"]["allocations"], 5);
    assert_eq!(v["unfreed"].as_array().map(Vec::len), Some(2));
    assert_eq!(v["double_frees"][0]["origin"]["file"], "mixed.c");
    assert_eq!(v["double_frees"][0]["allocated_at"]["line"], 12);
    assert_eq!(v["overruns"][0]["offset"], 6);
    assert_eq!(v["underruns"][0]["offset"], -8);
}

#[test]
fn every_scenario_runs_in_both_guard_modes() {
    for guards in [GuardMode::On, GuardMode::Off] {
        for s in Scenario::ALL {
            let cfg = TrackerConfig::new().with_guards(guards);
            let run = run_scenario(s, cfg, RunOptions::default()).expect("run");
            assert_eq!(run.scenario, s);
            assert!(run.rendered.starts_with(BANNER));
        }
    }
}
