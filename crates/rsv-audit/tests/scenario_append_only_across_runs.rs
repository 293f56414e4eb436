//! Scenario: one log, many runs
//!
//! GREEN when:
//! - A second run appended through a reopened writer continues the chain
//!   (the whole file still verifies).
//! - Prior lines are byte-identical after the second run.
//! - `read_run` returns only the requested run's rows, in order.
//! - Candidate rows carry chosen flag, tier rank and justification text.

use chrono::NaiveDate;
use rsv_audit::{read_run, run_ids, verify_hash_chain, DiagnosticsWriter, EventKind, VerifyResult};
use rsv_config::TierTable;
use rsv_overrides::OverrideRegistry;
use rsv_precedence::{resolve, ResolvePolicy};
use rsv_schemas::{FactRecord, ResolutionKey};
use serde_json::json;
use uuid::Uuid;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn record_run(path: &std::path::Path, run_id: Uuid) {
    let tiers = TierTable::from_ordered(&["ifrc_or_gov_sitrep", "reliefweb_pdf"]).unwrap();
    let key = ResolutionKey::new("SDN", "DR", "2025-03".parse().unwrap(), "people_in_need");
    let candidates = vec![
        FactRecord::new("ifrc", "go-1", &key, "ifrc_or_gov_sitrep", d("2025-03-28"))
            .with_value(120_000),
        FactRecord::new("reliefweb", "rw-9", &key, "reliefweb_pdf", d("2025-03-30"))
            .with_value(98_000),
    ];
    let resolved = resolve(
        &key,
        &candidates,
        &tiers,
        &OverrideRegistry::empty(),
        ResolvePolicy::default(),
    )
    .unwrap();

    let mut writer = DiagnosticsWriter::open(path).unwrap();
    writer
        .record(run_id, &key, resolved.as_ref(), &candidates)
        .unwrap();
}

#[test]
fn second_run_extends_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("diag").join("diagnostics.jsonl");
    let run_a = Uuid::new_v4();
    let run_b = Uuid::new_v4();

    record_run(&path, run_a);
    let after_first = std::fs::read_to_string(&path).unwrap();

    record_run(&path, run_b);
    let after_second = std::fs::read_to_string(&path).unwrap();

    assert!(after_second.starts_with(&after_first), "prior rows never rewritten");
    assert_eq!(verify_hash_chain(&path).unwrap(), VerifyResult::Valid { lines: 6 });

    let events = rsv_audit::read_events_str(&after_second).unwrap();
    assert_eq!(run_ids(&events), vec![run_a, run_b]);
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn read_run_filters_by_run_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("diagnostics.jsonl");
    let run_a = Uuid::new_v4();
    let run_b = Uuid::new_v4();
    record_run(&path, run_a);
    record_run(&path, run_b);

    let rows = read_run(&path, run_b).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|e| e.run_id == run_b));
    let kinds: Vec<EventKind> = rows.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Candidate, EventKind::Candidate, EventKind::Decision]
    );
}

#[test]
fn candidate_rows_explain_the_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("diagnostics.jsonl");
    let run = Uuid::new_v4();
    record_run(&path, run);

    let rows = read_run(&path, run).unwrap();
    let winner = &rows[0].payload;
    assert_eq!(winner["chosen"], json!(true));
    assert_eq!(winner["tier_rank"], json!(1));
    assert_eq!(winner["source_id"], json!("ifrc"));

    let loser = &rows[1].payload;
    assert_eq!(loser["chosen"], json!(false));
    assert_eq!(loser["tier_rank"], json!(2));
    assert!(loser["justification"]
        .as_str()
        .unwrap()
        .starts_with("rejected: lower tier rank"));

    let decision = &rows[2].payload;
    assert_eq!(rows[2].key, "SDN|DR|2025-03|people_in_need");
    assert_eq!(decision["value"], json!(120_000));
    assert_eq!(decision["decided_by"], json!("tier_rank"));
    assert_eq!(decision["candidate_count"], json!(2));
}
