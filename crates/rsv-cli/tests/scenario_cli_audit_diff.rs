//! Scenario: `rsv audit diff` between two runs in one log
//!
//! GREEN when:
//! - A review override added between runs shows up as a changed decision.
//! - An unknown run id is an error.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;

const RUN_A: &str = "00000000-0000-0000-0000-00000000000a";
const RUN_B: &str = "00000000-0000-0000-0000-00000000000b";

#[test]
fn override_between_runs_is_a_changed_decision() {
    let dir = tempfile::tempdir().unwrap();
    let p = |n: &str| dir.path().join(n).to_string_lossy().to_string();

    fs::write(p("resolver.yaml"), "tiers: [ifrc_or_gov_sitrep, un_agency]\n").unwrap();
    fs::write(
        p("facts.csv"),
        "source_id,event_id,country_iso3,hazard_code,month,metric,value,tier,as_of\n\
ifrc_go,go-1,ETH,DR,2025-03,pin_new,10000,ifrc_or_gov_sitrep,2025-03-28\n\
ipc,ipc-3,ETH,DR,2025-03,pin_new,9800,un_agency,2025-03-20\n",
    )
    .unwrap();
    fs::write(
        p("overrides.csv"),
        "country_iso3,hazard_code,month,metric,chosen_source,chosen_value,note,author,timestamp\n\
ETH,DR,2025-03,pin_new,ipc,9800,Harmonized to IPC bulletin,analyst_a,2025-04-02T10:00:00Z\n",
    )
    .unwrap();

    let base_args = |run_id: &str| {
        vec![
            "resolve".to_string(),
            "--facts".to_string(),
            p("facts.csv"),
            "--config".to_string(),
            p("resolver.yaml"),
            "--out-dir".to_string(),
            p("out"),
            "--run-id".to_string(),
            run_id.to_string(),
        ]
    };

    Command::cargo_bin("rsv").unwrap().args(base_args(RUN_A)).assert().success();

    let mut with_override = base_args(RUN_B);
    with_override.extend(["--overrides".to_string(), p("overrides.csv")]);
    Command::cargo_bin("rsv").unwrap().args(with_override).assert().success();

    Command::cargo_bin("rsv")
        .unwrap()
        .args([
            "audit",
            "diff",
            "--path",
            p("out/diagnostics.jsonl").as_str(),
            "--before",
            RUN_A,
            "--after",
            RUN_B,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("added=0 removed=0 changed=1 unchanged=0"))
        .stdout(predicate::str::contains("Harmonized to IPC bulletin"));

    Command::cargo_bin("rsv")
        .unwrap()
        .args([
            "audit",
            "diff",
            "--path",
            p("out/diagnostics.jsonl").as_str(),
            "--before",
            RUN_A,
            "--after",
            "00000000-0000-0000-0000-0000000000ff",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
