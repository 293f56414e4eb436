//! Scenario: per-lineage write serialization
//!
//! Many threads report strictly increasing levels for the same lineage, one
//! month each, in arbitrary interleaving. Because writes are serialized per
//! key, the sum of emitted deltas for the months that advanced the lineage
//! plus the baseline must equal the final stored level; no update is lost and
//! no reader ever sees a torn entry.

use chrono::NaiveDate;
use rsv_levels::{InMemoryLevelStore, LevelHistoryStore, LevelPolicy};
use rsv_schemas::{DeltaFlag, LineageKey, YearMonth};
use std::sync::Arc;

fn month(i: u32) -> YearMonth {
    YearMonth::new(2020 + (i / 12) as i32, i % 12 + 1).unwrap()
}

#[test]
fn concurrent_writers_on_one_lineage_never_lose_updates() {
    let store = Arc::new(InMemoryLevelStore::new(LevelPolicy::default()));
    let key = LineageKey::new("acled", "COL", "CU", "pin_new");
    let as_of = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

    let handles: Vec<_> = (0..48u32)
        .map(|i| {
            let store = Arc::clone(&store);
            let key = key.clone();
            std::thread::spawn(move || {
                // Level grows with the month index.
                let out = store.compute_delta(&key, (i as u64 + 1) * 100, as_of, month(i));
                (i, out)
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let last = store.get_last(&key).unwrap();
    assert_eq!(last.month, month(47), "latest month must win");
    assert_eq!(last.level, 4_800);

    let baselines = outcomes
        .iter()
        .filter(|(_, o)| o.has_flag(DeltaFlag::Baseline))
        .count();
    assert_eq!(baselines, 1, "exactly one writer sees an empty lineage");

    let advanced_sum: u64 = outcomes
        .iter()
        .filter(|(_, o)| o.advanced)
        .map(|(_, o)| o.value)
        .sum();
    assert_eq!(advanced_sum, last.level, "advancing deltas telescope to the final level");
}

#[test]
fn readers_observe_only_committed_entries() {
    let store = Arc::new(InMemoryLevelStore::new(LevelPolicy::default()));
    let key = LineageKey::new("dtm", "SSD", "CU", "displaced");
    let as_of = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

    let writer = {
        let store = Arc::clone(&store);
        let key = key.clone();
        std::thread::spawn(move || {
            for i in 0..200u32 {
                store.compute_delta(&key, (i as u64 + 1) * 10, as_of, month(i));
            }
        })
    };

    let reader = {
        let store = Arc::clone(&store);
        let key = key.clone();
        std::thread::spawn(move || {
            for _ in 0..2_000 {
                if let Some(e) = store.get_last(&key) {
                    // Level and month are always written together.
                    let idx = (e.month.year() - 2020) as u64 * 12 + (e.month.month() as u64 - 1);
                    assert_eq!(e.level, (idx + 1) * 10);
                }
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}
