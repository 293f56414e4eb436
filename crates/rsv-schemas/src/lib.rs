//! rsv-schemas
//!
//! Normalized record shapes shared by every resolver crate. Producers
//! (connectors, PDF extraction, schema validation) live outside this
//! workspace and hand over `FactRecord`s in exactly this shape.

mod month;

pub use month::YearMonth;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Selected source label used when an override does not match any candidate.
pub const REVIEW_OVERRIDE_SOURCE: &str = "review_override";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    Month(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Month(raw) => write!(f, "invalid month '{raw}' (expected YYYY-MM)"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Whether a record reports a monthly flow or a cumulative level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSemantics {
    #[default]
    New,
    Stock,
}

impl SeriesSemantics {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesSemantics::New => "new",
            SeriesSemantics::Stock => "stock",
        }
    }
}

/// Producers spell this many ways ("Stock", "stocks", "new_flow", "").
/// Anything mentioning stock is a level; everything else is a flow.
impl FromStr for SeriesSemantics {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        if lowered.contains("stock") {
            Ok(SeriesSemantics::Stock)
        } else {
            Ok(SeriesSemantics::New)
        }
    }
}

impl<'de> Deserialize<'de> for SeriesSemantics {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(raw.parse().unwrap_or_default())
    }
}

/// Recoverable conditions raised while turning a level into a delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaFlag {
    /// First observation for the lineage; the level itself is the delta.
    Baseline,
    /// Month did not advance past the stored month; state untouched.
    StaleReplay,
    /// Large downward restatement, clamped to zero.
    RebasingDetected,
    /// Small decrease below the rebasing threshold, clamped to zero.
    NegativeClamped,
}

impl DeltaFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaFlag::Baseline => "baseline",
            DeltaFlag::StaleReplay => "stale_replay",
            DeltaFlag::RebasingDetected => "rebasing_detected",
            DeltaFlag::NegativeClamped => "negative_clamped",
        }
    }
}

impl fmt::Display for DeltaFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (country, hazard, month, metric): one canonical value is produced per key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolutionKey {
    pub country_iso3: String,
    pub hazard_code: String,
    pub month: YearMonth,
    pub metric: String,
}

impl ResolutionKey {
    pub fn new(
        country_iso3: impl Into<String>,
        hazard_code: impl Into<String>,
        month: YearMonth,
        metric: impl Into<String>,
    ) -> Self {
        Self {
            country_iso3: country_iso3.into(),
            hazard_code: hazard_code.into(),
            month,
            metric: metric.into(),
        }
    }
}

impl fmt::Display for ResolutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.country_iso3, self.hazard_code, self.month, self.metric
        )
    }
}

/// (family, country, hazard, metric): one cumulative time series.
///
/// Deliberately has no month: all reports of a series share one lineage.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineageKey {
    pub family: String,
    pub country_iso3: String,
    pub hazard_code: String,
    pub metric: String,
}

impl LineageKey {
    pub fn new(
        family: impl Into<String>,
        country_iso3: impl Into<String>,
        hazard_code: impl Into<String>,
        metric: impl Into<String>,
    ) -> Self {
        Self {
            family: family.into(),
            country_iso3: country_iso3.into(),
            hazard_code: hazard_code.into(),
            metric: metric.into(),
        }
    }
}

impl fmt::Display for LineageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.country_iso3, self.hazard_code, self.metric, self.family
        )
    }
}

/// One normalized observation from one source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    pub source_id: String,
    pub event_id: String,
    pub country_iso3: String,
    pub hazard_code: String,
    pub month: YearMonth,
    pub metric: String,
    /// Monthly new figure.
    #[serde(default)]
    pub value: Option<u64>,
    /// Cumulative level, present on stock reports.
    #[serde(default)]
    pub value_level: Option<u64>,
    pub tier: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub as_of: NaiveDate,
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub definition_text: String,
    #[serde(default)]
    pub series_semantics: SeriesSemantics,
    #[serde(default)]
    pub revision: u32,
    /// Lineage family for level differencing; falls back to `event_id`.
    #[serde(default)]
    pub source_family: Option<String>,
    #[serde(default)]
    pub method_details: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<DeltaFlag>,
}

impl FactRecord {
    /// Minimal flow record; the remaining fields default and can be set directly
    /// or through the `with_*` helpers.
    pub fn new(
        source_id: impl Into<String>,
        event_id: impl Into<String>,
        key: &ResolutionKey,
        tier: impl Into<String>,
        as_of: NaiveDate,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            event_id: event_id.into(),
            country_iso3: key.country_iso3.clone(),
            hazard_code: key.hazard_code.clone(),
            month: key.month,
            metric: key.metric.clone(),
            value: None,
            value_level: None,
            tier: tier.into(),
            confidence: None,
            as_of,
            publication_date: None,
            source_type: String::new(),
            source_url: String::new(),
            definition_text: String::new(),
            series_semantics: SeriesSemantics::New,
            revision: 0,
            source_family: None,
            method_details: None,
            flags: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: u64) -> Self {
        self.value = Some(value);
        self
    }

    /// Marks the record as a stock report carrying `level`.
    pub fn with_level(mut self, level: u64) -> Self {
        self.value_level = Some(level);
        self.series_semantics = SeriesSemantics::Stock;
        self
    }

    pub fn with_publication_date(mut self, date: NaiveDate) -> Self {
        self.publication_date = Some(date);
        self
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.source_family = Some(family.into());
        self
    }

    pub fn resolution_key(&self) -> ResolutionKey {
        ResolutionKey {
            country_iso3: self.country_iso3.clone(),
            hazard_code: self.hazard_code.clone(),
            month: self.month,
            metric: self.metric.clone(),
        }
    }

    pub fn lineage_key(&self) -> LineageKey {
        let family = self
            .source_family
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(&self.event_id);
        LineageKey::new(
            family,
            self.country_iso3.clone(),
            self.hazard_code.clone(),
            self.metric.clone(),
        )
    }

    /// Stable composite key for the last tie-break step: source then event.
    pub fn composite_key(&self) -> String {
        format!("{}{}", self.source_id, self.event_id)
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// True when the level store must convert this record before resolution.
    pub fn needs_level_conversion(&self) -> bool {
        self.series_semantics == SeriesSemantics::Stock && self.value_level.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ResolutionKey {
        ResolutionKey::new("SDN", "DR", "2025-03".parse().unwrap(), "people_in_need")
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn series_semantics_canonicalization() {
        assert_eq!("Stock".parse::<SeriesSemantics>().unwrap(), SeriesSemantics::Stock);
        assert_eq!("stocks".parse::<SeriesSemantics>().unwrap(), SeriesSemantics::Stock);
        assert_eq!("new_flow".parse::<SeriesSemantics>().unwrap(), SeriesSemantics::New);
        assert_eq!("".parse::<SeriesSemantics>().unwrap(), SeriesSemantics::New);
    }

    #[test]
    fn lineage_falls_back_to_event_id() {
        let r = FactRecord::new("reliefweb", "evt-1", &key(), "reliefweb_pdf", date("2025-03-28"));
        assert_eq!(r.lineage_key().family, "evt-1");

        let r = r.with_family("reliefweb_pdf");
        assert_eq!(r.lineage_key().family, "reliefweb_pdf");
        assert_eq!(r.lineage_key().to_string(), "SDN|DR|people_in_need|reliefweb_pdf");
    }

    #[test]
    fn resolution_key_round_trips_through_record() {
        let r = FactRecord::new("ifrc", "e", &key(), "t", date("2025-03-01"));
        assert_eq!(r.resolution_key(), key());
        assert_eq!(key().to_string(), "SDN|DR|2025-03|people_in_need");
    }

    #[test]
    fn missing_optional_fields_deserialize_to_defaults() {
        let raw = r#"{
            "source_id": "dtm", "event_id": "e1", "country_iso3": "SSD",
            "hazard_code": "CU", "month": "2025-01", "metric": "pa_new",
            "tier": "agency", "as_of": "2025-01-31", "series_semantics": null
        }"#;
        let r: FactRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(r.value, None);
        assert_eq!(r.series_semantics, SeriesSemantics::New);
        assert!(r.flags.is_empty());
        assert!(!r.needs_level_conversion());
    }
}
