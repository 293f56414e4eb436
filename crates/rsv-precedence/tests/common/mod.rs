#![allow(dead_code)]

use chrono::NaiveDate;
use rsv_config::TierTable;
use rsv_schemas::{FactRecord, ResolutionKey};

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn key(country: &str, hazard: &str, month: &str, metric: &str) -> ResolutionKey {
    ResolutionKey::new(country, hazard, month.parse().unwrap(), metric)
}

pub fn tiers() -> TierTable {
    TierTable::from_ordered(&[
        "ifrc_or_gov_sitrep",
        "un_agency",
        "reliefweb_pdf",
        "media_discovery_only",
    ])
    .unwrap()
}

pub fn fact(
    key: &ResolutionKey,
    source: &str,
    event: &str,
    tier: &str,
    as_of: &str,
    value: Option<u64>,
) -> FactRecord {
    let mut r = FactRecord::new(source, event, key, tier, d(as_of));
    r.value = value;
    r
}
