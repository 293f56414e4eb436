//! Scenario: resolution is deterministic
//!
//! 1. Any permutation of the same candidate set yields a byte-identical
//!    serialized ResolvedFact (winner and diagnostics).
//! 2. Exact duplicates (same composite key) still resolve identically.
//! 3. The unknown-tier error names the same candidate for any input order.

mod common;

use common::{d, fact, key, tiers};
use rsv_overrides::OverrideRegistry;
use rsv_precedence::{resolve, ResolveError, ResolvePolicy};
use rsv_schemas::FactRecord;

fn serialized(candidates: &[FactRecord]) -> String {
    let k = key("NGA", "FL", "2025-04", "pin_new");
    let resolved = resolve(
        &k,
        candidates,
        &tiers(),
        &OverrideRegistry::empty(),
        ResolvePolicy::default(),
    )
    .unwrap()
    .unwrap();
    serde_json::to_string(&resolved).unwrap()
}

fn candidate_set() -> Vec<FactRecord> {
    let k = key("NGA", "FL", "2025-04", "pin_new");
    vec![
        fact(&k, "gdacs", "g-1", "un_agency", "2025-04-10", Some(2_000)),
        fact(&k, "ifrc", "i-1", "un_agency", "2025-04-10", Some(2_100)),
        fact(&k, "dtm", "d-1", "un_agency", "2025-04-10", None),
        fact(&k, "media", "m-1", "media_discovery_only", "2025-04-12", Some(9_999))
            .with_publication_date(d("2025-04-12")),
        fact(&k, "rw", "r-1", "reliefweb_pdf", "2025-04-01", Some(1_800)),
    ]
}

/// All rotations plus the reverse: enough to move every element everywhere.
fn permutations(base: &[FactRecord]) -> Vec<Vec<FactRecord>> {
    let mut out = Vec::new();
    for shift in 0..base.len() {
        let mut v = base.to_vec();
        v.rotate_left(shift);
        out.push(v.clone());
        v.reverse();
        out.push(v);
    }
    out
}

#[test]
fn input_order_does_not_change_output() {
    let base = candidate_set();
    let expected = serialized(&base);
    for perm in permutations(&base) {
        assert_eq!(serialized(&perm), expected);
    }
}

#[test]
fn repeated_runs_are_identical() {
    let base = candidate_set();
    assert_eq!(serialized(&base), serialized(&base));
}

#[test]
fn exact_duplicates_resolve_identically() {
    let k = key("NGA", "FL", "2025-04", "pin_new");
    let mut rev0 = fact(&k, "gdacs", "g-1", "un_agency", "2025-04-10", Some(2_000));
    let mut rev1 = rev0.clone();
    rev1.revision = 1;
    rev1.value = Some(2_050);
    rev0.revision = 0;

    let a = serialized(&[rev0.clone(), rev1.clone()]);
    let b = serialized(&[rev1, rev0]);
    assert_eq!(a, b);
    assert!(a.contains("\"value\":2050"), "higher revision wins a key collision");
}

#[test]
fn unknown_tier_error_is_order_independent() {
    let k = key("NGA", "FL", "2025-04", "pin_new");
    let set = vec![
        fact(&k, "zz", "1", "blog", "2025-04-10", Some(1)),
        fact(&k, "aa", "1", "rumour", "2025-04-10", Some(1)),
        fact(&k, "gdacs", "1", "un_agency", "2025-04-10", Some(1)),
    ];
    let mut reversed = set.clone();
    reversed.reverse();

    let e1 = resolve(&k, &set, &tiers(), &OverrideRegistry::empty(), ResolvePolicy::default())
        .unwrap_err();
    let e2 = resolve(&k, &reversed, &tiers(), &OverrideRegistry::empty(), ResolvePolicy::default())
        .unwrap_err();
    assert_eq!(e1, e2);
    match e1 {
        ResolveError::UnknownTier { tier, source_id, .. } => {
            assert_eq!(tier, "rumour");
            assert_eq!(source_id, "aa");
        }
        other => panic!("expected UnknownTier, got {other:?}"),
    }
}
