//! Scenario: level history converts cumulative levels into monthly deltas
//!
//! # Invariants under test
//!
//! 1. Baseline: no prior entry → value == new level, flag `baseline`.
//! 2. Growth between months is the plain difference.
//! 3. Rebasing: 500000 → 50000 with threshold 0.5 yields
//!    value 0, flags [rebasing_detected], raw delta -450000 kept for audit.
//! 4. A report whose month does not advance is `stale_replay` and does not
//!    move stored state.
//! 5. Value is never negative for any drop size.

use chrono::NaiveDate;
use rsv_levels::{InMemoryLevelStore, LevelHistoryStore, LevelPolicy};
use rsv_schemas::{DeltaFlag, LineageKey, YearMonth};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn ym(s: &str) -> YearMonth {
    s.parse().unwrap()
}

fn lineage() -> LineageKey {
    LineageKey::new("reliefweb_pdf", "SDN", "DR", "people_in_need")
}

fn store() -> InMemoryLevelStore {
    InMemoryLevelStore::new(LevelPolicy {
        rebasing_threshold: 0.5,
    })
}

#[test]
fn first_report_is_baseline() {
    let s = store();
    assert!(s.get_last(&lineage()).is_none());

    let out = s.compute_delta(&lineage(), 120_000, d("2025-03-28"), ym("2025-03"));
    assert_eq!(out.value, 120_000);
    assert_eq!(out.flags, vec![DeltaFlag::Baseline]);
    assert_eq!(out.previous_level, None);

    let last = s.get_last(&lineage()).expect("baseline must be stored");
    assert_eq!(last.level, 120_000);
    assert_eq!(last.month, ym("2025-03"));
}

#[test]
fn growth_between_months_is_the_difference() {
    let s = store();
    s.compute_delta(&lineage(), 100_000, d("2025-01-31"), ym("2025-01"));
    let out = s.compute_delta(&lineage(), 130_000, d("2025-02-28"), ym("2025-02"));
    assert_eq!(out.value, 30_000);
    assert!(out.flags.is_empty());
    assert_eq!(out.previous_level, Some(100_000));
}

#[test]
fn large_drop_is_rebasing_clamped_to_zero() {
    let s = store();
    s.compute_delta(&lineage(), 500_000, d("2025-02-27"), ym("2025-02"));

    let out = s.compute_delta(&lineage(), 50_000, d("2025-03-30"), ym("2025-03"));
    assert_eq!(out.value, 0);
    assert_eq!(out.flags, vec![DeltaFlag::RebasingDetected]);
    assert_eq!(out.raw_delta, -450_000);
    assert!(
        out.method_details.contains("-450000"),
        "raw delta must be retained in method details: {}",
        out.method_details
    );

    // The restated level becomes the new reference point.
    assert_eq!(s.get_last(&lineage()).unwrap().level, 50_000);
}

#[test]
fn out_of_order_report_is_stale_replay_and_not_applied() {
    let s = store();
    s.compute_delta(&lineage(), 200_000, d("2025-03-30"), ym("2025-03"));

    let out = s.compute_delta(&lineage(), 180_000, d("2025-02-27"), ym("2025-02"));
    assert!(out.has_flag(DeltaFlag::StaleReplay));
    assert!(!out.advanced);
    assert_eq!(out.value, 0, "never negative even when stale");
    assert_eq!(out.publishable_value(), None, "stale delta is audit-only");

    let last = s.get_last(&lineage()).unwrap();
    assert_eq!(last.level, 200_000);
    assert_eq!(last.month, ym("2025-03"));
}

#[test]
fn same_month_restatement_is_stale_replay() {
    let s = store();
    s.compute_delta(&lineage(), 200_000, d("2025-03-10"), ym("2025-03"));
    let out = s.compute_delta(&lineage(), 210_000, d("2025-03-25"), ym("2025-03"));
    assert_eq!(out.flags, vec![DeltaFlag::StaleReplay]);
    assert_eq!(out.value, 10_000);
    assert_eq!(out.publishable_value(), None);
    assert_eq!(s.get_last(&lineage()).unwrap().level, 200_000);
}

#[test]
fn replaying_the_stored_report_republishes_its_delta() {
    let s = store();
    s.compute_delta(&lineage(), 150_000, d("2025-02-27"), ym("2025-02"));
    let first = s.compute_delta(&lineage(), 180_000, d("2025-03-30"), ym("2025-03"));
    assert_eq!(first.publishable_value(), Some(30_000));

    let again = s.compute_delta(&lineage(), 180_000, d("2025-03-30"), ym("2025-03"));
    assert!(again.has_flag(DeltaFlag::StaleReplay));
    assert_eq!(again.publishable_value(), Some(30_000));
    assert_eq!(s.get_last(&lineage()).unwrap().delta, Some(30_000));
}

#[test]
fn values_are_never_negative() {
    for new_level in [0_u64, 1, 249_999, 250_000, 499_999] {
        let s = store();
        s.compute_delta(&lineage(), 500_000, d("2025-01-31"), ym("2025-01"));
        let out = s.compute_delta(&lineage(), new_level, d("2025-02-28"), ym("2025-02"));
        assert_eq!(out.value, 0, "level {new_level}");
        assert!(out.raw_delta < 0);
        assert!(
            out.has_flag(DeltaFlag::RebasingDetected) || out.has_flag(DeltaFlag::NegativeClamped)
        );
    }
}

#[test]
fn lineages_are_independent() {
    let s = store();
    let other = LineageKey::new("dtm", "SDN", "DR", "people_in_need");
    s.compute_delta(&lineage(), 10, d("2025-01-31"), ym("2025-01"));
    let out = s.compute_delta(&other, 7, d("2025-01-31"), ym("2025-01"));
    assert_eq!(out.flags, vec![DeltaFlag::Baseline]);
    assert_eq!(s.len(), 2);
}
