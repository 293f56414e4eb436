//! Level → delta decision (pure).
//!
//! # Invariants
//!
//! - **Baseline**: no prior entry → `value == new_level`, flag `baseline`.
//! - **Forward only**: the entry to commit is produced only when `new_month`
//!   is strictly after the stored month. Otherwise the report is flagged
//!   `stale_replay` and nothing is committed. The stale value is computed for
//!   audit only; callers must not publish it.
//! - **Replay**: re-submitting exactly the stored report (same month, level
//!   and as_of) yields the value published when it was committed, in
//!   `replayed_value`, so re-running the same input publishes the same figure.
//! - **Non-negative**: `value` is never below zero. A decrease whose magnitude
//!   exceeds `rebasing_threshold × prior.level` is flagged `rebasing_detected`;
//!   a smaller one is flagged `negative_clamped`. Both keep the true
//!   `raw_delta` for audit.

use chrono::NaiveDate;
use rsv_schemas::{DeltaFlag, YearMonth};
use serde::{Deserialize, Serialize};

/// Last known cumulative level of one lineage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelHistoryEntry {
    pub level: u64,
    pub as_of: NaiveDate,
    pub month: YearMonth,
    /// Value published when this entry was committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelPolicy {
    pub rebasing_threshold: f64,
}

impl Default for LevelPolicy {
    fn default() -> Self {
        Self {
            rebasing_threshold: 0.5,
        }
    }
}

/// Result of converting one level report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaOutcome {
    /// Monthly new value, clamped at zero.
    pub value: u64,
    pub flags: Vec<DeltaFlag>,
    /// `new_level - prior.level` before clamping (the level itself on baseline).
    pub raw_delta: i64,
    pub previous_level: Option<u64>,
    pub method_details: String,
    /// Whether stored state moved to the new level.
    pub advanced: bool,
    /// Set only when the report is exactly the stored one.
    pub replayed_value: Option<u64>,
}

impl DeltaOutcome {
    pub fn has_flag(&self, flag: DeltaFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// The value a converted record may carry: the delta when the lineage
    /// advanced, the originally published delta on an exact replay, and
    /// nothing otherwise.
    pub fn publishable_value(&self) -> Option<u64> {
        if self.advanced {
            Some(self.value)
        } else {
            self.replayed_value
        }
    }
}

/// Decide the delta for `new_level` given the stored `prior`.
///
/// Returns the outcome plus the entry the store must commit, if any.
pub fn evaluate_delta(
    prior: Option<&LevelHistoryEntry>,
    new_level: u64,
    new_as_of: NaiveDate,
    new_month: YearMonth,
    policy: LevelPolicy,
) -> (DeltaOutcome, Option<LevelHistoryEntry>) {
    let entry_for = |value: u64| LevelHistoryEntry {
        level: new_level,
        as_of: new_as_of,
        month: new_month,
        delta: Some(value),
    };

    let Some(prior) = prior else {
        let outcome = DeltaOutcome {
            value: new_level,
            flags: vec![DeltaFlag::Baseline],
            raw_delta: saturating_i64(new_level as i128),
            previous_level: None,
            method_details: "delta_from_level(first_observation)".to_string(),
            advanced: true,
            replayed_value: None,
        };
        return (outcome, Some(entry_for(new_level)));
    };

    let raw_delta = saturating_i64(new_level as i128 - prior.level as i128);
    let advances = new_month > prior.month;

    let mut flags = Vec::new();
    let mut details = vec![format!(
        "delta_from_level(prev={},new={},raw={})",
        prior.level, new_level, raw_delta
    )];

    let replayed_value = if advances {
        None
    } else {
        flags.push(DeltaFlag::StaleReplay);
        details.push(format!(
            "stale_replay(stored_month={},report_month={})",
            prior.month, new_month
        ));
        let exact = prior.month == new_month && prior.level == new_level && prior.as_of == new_as_of;
        exact.then_some(prior.delta).flatten()
    };

    let value = if raw_delta >= 0 {
        raw_delta as u64
    } else {
        let magnitude = raw_delta.unsigned_abs() as f64;
        if magnitude > policy.rebasing_threshold * prior.level as f64 {
            flags.push(DeltaFlag::RebasingDetected);
            details.push(format!(
                "rebasing_detected(raw_delta={},threshold={})",
                raw_delta, policy.rebasing_threshold
            ));
        } else {
            flags.push(DeltaFlag::NegativeClamped);
            details.push(format!("negative_clamped(raw_delta={raw_delta})"));
        }
        0
    };

    let outcome = DeltaOutcome {
        value,
        flags,
        raw_delta,
        previous_level: Some(prior.level),
        method_details: details.join("; "),
        advanced: advances,
        replayed_value,
    };
    (outcome, advances.then(|| entry_for(value)))
}

fn saturating_i64(v: i128) -> i64 {
    v.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
