//! Scenario: diffing two runs
//!
//! GREEN when:
//! - Identical decisions produce an empty diff.
//! - A changed winner shows up under `changed` with both payloads.
//! - Keys present in only one run are `added` / `removed`.

use chrono::NaiveDate;
use rsv_audit::{diff_runs, DiagnosticEvent, DiagnosticsWriter, MemorySink};
use rsv_config::TierTable;
use rsv_overrides::OverrideRegistry;
use rsv_precedence::{resolve, ResolvePolicy};
use rsv_schemas::{FactRecord, ResolutionKey};
use serde_json::json;
use uuid::Uuid;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn key(month: &str) -> ResolutionKey {
    ResolutionKey::new("NGA", "FL", month.parse().unwrap(), "pin_new")
}

/// Each entry is (month, [(source, value)]) resolved under one run id.
fn run(inputs: &[(&str, &[(&str, u64)])]) -> Vec<DiagnosticEvent> {
    let tiers = TierTable::from_ordered(&["un_agency"]).unwrap();
    let mut writer = DiagnosticsWriter::new(MemorySink::new());
    let run_id = Uuid::new_v4();
    let mut events = Vec::new();

    for (month, rows) in inputs {
        let k = key(month);
        let candidates: Vec<FactRecord> = rows
            .iter()
            .map(|(src, v)| FactRecord::new(*src, "e", &k, "un_agency", d("2025-04-10")).with_value(*v))
            .collect();
        let resolved = resolve(
            &k,
            &candidates,
            &tiers,
            &OverrideRegistry::empty(),
            ResolvePolicy::default(),
        )
        .unwrap();
        events.extend(writer.record(run_id, &k, resolved.as_ref(), &candidates).unwrap());
    }
    events
}

#[test]
fn identical_runs_have_empty_diff() {
    let input: &[(&str, &[(&str, u64)])] = &[("2025-04", &[("gdacs", 2_000), ("ifrc", 2_100)])];
    let diff = diff_runs(&run(input), &run(input));
    assert!(diff.is_empty());
    assert_eq!(diff.unchanged, 1);
}

#[test]
fn changed_winner_is_reported() {
    let before = run(&[("2025-04", &[("ifrc", 2_100)])]);
    let after = run(&[("2025-04", &[("gdacs", 2_000), ("ifrc", 2_100)])]);

    let diff = diff_runs(&before, &after);
    assert_eq!(diff.changed.len(), 1);
    let change = &diff.changed[0];
    assert_eq!(change.key, "NGA|FL|2025-04|pin_new");
    assert_eq!(change.before["selected_source"], json!("ifrc"));
    assert_eq!(change.after["selected_source"], json!("gdacs"));
}

#[test]
fn added_and_removed_keys() {
    let before = run(&[("2025-03", &[("ifrc", 1)])]);
    let after = run(&[("2025-04", &[("ifrc", 1)])]);

    let diff = diff_runs(&before, &after);
    assert_eq!(diff.removed, vec!["NGA|FL|2025-03|pin_new".to_string()]);
    assert_eq!(diff.added, vec!["NGA|FL|2025-04|pin_new".to_string()]);
    assert!(diff.changed.is_empty());
}
