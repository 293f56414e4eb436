//! Normalized facts CSV.
//!
//! One row per observation. Optional columns may be omitted or left empty.
//! `series_semantics` accepts `new`, `flow`, `stock` (case-insensitive,
//! empty = new).

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rsv_schemas::{FactRecord, SeriesSemantics, YearMonth};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct FactRow {
    source_id: String,
    event_id: String,
    country_iso3: String,
    #[serde(alias = "hazard_type")]
    hazard_code: String,
    month: YearMonth,
    metric: String,
    #[serde(default)]
    value: Option<u64>,
    #[serde(default)]
    value_level: Option<u64>,
    tier: String,
    #[serde(default)]
    confidence: Option<f64>,
    as_of: NaiveDate,
    #[serde(default)]
    publication_date: Option<NaiveDate>,
    #[serde(default)]
    source_type: String,
    #[serde(default)]
    source_url: String,
    #[serde(default)]
    definition_text: String,
    #[serde(default)]
    series_semantics: String,
    #[serde(default)]
    revision: Option<u32>,
    #[serde(default)]
    source_family: Option<String>,
}

pub fn load_facts_csv(path: impl AsRef<Path>) -> Result<Vec<FactRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("open facts {:?}", path))?;
    parse_facts_csv(file).with_context(|| format!("parse facts {:?}", path))
}

pub fn parse_facts_csv<R: Read>(reader: R) -> Result<Vec<FactRecord>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut out = Vec::new();

    for (i, row) in rdr.deserialize::<FactRow>().enumerate() {
        let line = i + 2;
        let row = row.with_context(|| format!("bad fact row at line {line}"))?;
        let Ok(series_semantics) = row.series_semantics.parse::<SeriesSemantics>();

        out.push(FactRecord {
            source_id: row.source_id,
            event_id: row.event_id,
            country_iso3: row.country_iso3,
            hazard_code: row.hazard_code,
            month: row.month,
            metric: row.metric,
            value: row.value,
            value_level: row.value_level,
            tier: row.tier,
            confidence: row.confidence,
            as_of: row.as_of,
            publication_date: row.publication_date,
            source_type: row.source_type,
            source_url: row.source_url,
            definition_text: row.definition_text,
            series_semantics,
            revision: row.revision.unwrap_or(0),
            source_family: row.source_family.filter(|f| !f.is_empty()),
            method_details: None,
            flags: Vec::new(),
        });
    }

    Ok(out)
}
