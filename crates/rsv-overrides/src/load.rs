//! Review CSV loader.
//!
//! Required columns: `country_iso3`, `hazard_code`, `month`, `metric`,
//! `chosen_source`, `chosen_value`, `note`, `author`, `timestamp`.
//! Optional: `revoked` (true/false/1/0/yes/no; default false).
//!
//! `timestamp` is RFC 3339 or a plain `YYYY-MM-DD` (midnight UTC).
//! Structural validation (empty note) is left to the registry so strict and
//! lenient runs can treat it differently.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rsv_schemas::{ResolutionKey, YearMonth};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

use crate::OverrideEntry;

#[derive(Debug, Deserialize)]
struct OverrideRow {
    country_iso3: String,
    #[serde(alias = "hazard_type")]
    hazard_code: String,
    month: String,
    metric: String,
    #[serde(alias = "selected_source")]
    chosen_source: String,
    #[serde(alias = "value")]
    chosen_value: u64,
    #[serde(default, alias = "override_note")]
    note: String,
    #[serde(default)]
    author: String,
    timestamp: String,
    #[serde(default)]
    revoked: String,
}

pub fn load_overrides_csv(path: impl AsRef<Path>) -> Result<Vec<OverrideEntry>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("open overrides {:?}", path))?;
    parse_overrides_csv(file).with_context(|| format!("parse overrides {:?}", path))
}

pub fn parse_overrides_csv<R: Read>(reader: R) -> Result<Vec<OverrideEntry>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut out = Vec::new();

    for (i, row) in rdr.deserialize::<OverrideRow>().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let row = row.with_context(|| format!("bad override row at line {line}"))?;

        let month: YearMonth = row
            .month
            .parse()
            .with_context(|| format!("bad month at line {line}"))?;
        let timestamp =
            parse_timestamp(&row.timestamp).with_context(|| format!("bad timestamp at line {line}"))?;
        let revoked =
            parse_flag(&row.revoked).with_context(|| format!("bad revoked flag at line {line}"))?;

        out.push(OverrideEntry {
            key: ResolutionKey::new(row.country_iso3, row.hazard_code, month, row.metric),
            chosen_source: row.chosen_source,
            chosen_value: row.chosen_value,
            note: row.note,
            author: row.author,
            timestamp,
            revoked,
        });
    }

    Ok(out)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| anyhow!("expected RFC 3339 or YYYY-MM-DD, got '{raw}'"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| anyhow!("invalid date '{raw}'"))
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "no" => Ok(false),
        "true" | "1" | "yes" => Ok(true),
        other => Err(anyhow!("expected a boolean, got '{other}'")),
    }
}
