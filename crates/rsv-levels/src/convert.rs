//! Stock → new conversion over a batch of records.
//!
//! Level-bearing records are grouped by lineage. Each lineage is replayed in
//! (month, as_of, publication_date, source, event, revision) order on one
//! worker, so the result does not depend on arrival order; different lineages
//! run on different workers.

use rsv_schemas::{DeltaFlag, FactRecord, LineageKey, SeriesSemantics};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::store::LevelHistoryStore;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    pub converted: usize,
    pub baselines: usize,
    pub stale_replays: usize,
    pub rebasings: usize,
    pub negative_clamps: usize,
}

impl ConversionStats {
    fn absorb(&mut self, other: &ConversionStats) {
        self.converted += other.converted;
        self.baselines += other.baselines;
        self.stale_replays += other.stale_replays;
        self.rebasings += other.rebasings;
        self.negative_clamps += other.negative_clamps;
    }
}

#[derive(Clone, Debug)]
pub struct ConversionReport {
    /// Same length and order as the input.
    pub records: Vec<FactRecord>,
    pub stats: ConversionStats,
}

pub fn apply_levels(
    records: Vec<FactRecord>,
    store: &dyn LevelHistoryStore,
    workers: usize,
) -> ConversionReport {
    let mut out: Vec<Option<FactRecord>> = Vec::with_capacity(records.len());
    let mut lineages: BTreeMap<LineageKey, Vec<(usize, FactRecord)>> = BTreeMap::new();

    for (idx, rec) in records.into_iter().enumerate() {
        if rec.needs_level_conversion() {
            lineages.entry(rec.lineage_key()).or_default().push((idx, rec));
            out.push(None);
        } else {
            out.push(Some(rec));
        }
    }

    for group in lineages.values_mut() {
        group.sort_by(|(_, a), (_, b)| replay_order(a, b));
    }

    let groups: Vec<(LineageKey, Vec<(usize, FactRecord)>)> = lineages.into_iter().collect();
    let workers = workers.max(1).min(groups.len().max(1));
    let mut buckets: Vec<Vec<(LineageKey, Vec<(usize, FactRecord)>)>> =
        (0..workers).map(|_| Vec::new()).collect();
    for (i, g) in groups.into_iter().enumerate() {
        buckets[i % workers].push(g);
    }

    let results: Vec<(Vec<(usize, FactRecord)>, ConversionStats)> = std::thread::scope(|s| {
        let handles: Vec<_> = buckets
            .into_iter()
            .map(|bucket| s.spawn(move || convert_bucket(bucket, store)))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(r) => r,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut stats = ConversionStats::default();
    for (converted, bucket_stats) in results {
        stats.absorb(&bucket_stats);
        for (idx, rec) in converted {
            out[idx] = Some(rec);
        }
    }

    ConversionReport {
        records: out.into_iter().flatten().collect(),
        stats,
    }
}

fn replay_order(a: &FactRecord, b: &FactRecord) -> std::cmp::Ordering {
    a.month
        .cmp(&b.month)
        .then_with(|| a.as_of.cmp(&b.as_of))
        .then_with(|| a.publication_date.cmp(&b.publication_date))
        .then_with(|| a.source_id.cmp(&b.source_id))
        .then_with(|| a.event_id.cmp(&b.event_id))
        .then_with(|| a.revision.cmp(&b.revision))
}

fn convert_bucket(
    bucket: Vec<(LineageKey, Vec<(usize, FactRecord)>)>,
    store: &dyn LevelHistoryStore,
) -> (Vec<(usize, FactRecord)>, ConversionStats) {
    let mut stats = ConversionStats::default();
    let mut out = Vec::new();

    for (lineage, group) in bucket {
        for (idx, mut rec) in group {
            let Some(level) = rec.value_level else {
                out.push((idx, rec));
                continue;
            };

            let outcome = store.compute_delta(&lineage, level, rec.as_of, rec.month);
            stats.converted += 1;

            for flag in &outcome.flags {
                match flag {
                    DeltaFlag::Baseline => stats.baselines += 1,
                    DeltaFlag::StaleReplay => {
                        stats.stale_replays += 1;
                        warn!(lineage = %lineage, month = %rec.month, "stale_replay: level report does not advance lineage");
                    }
                    DeltaFlag::RebasingDetected => {
                        stats.rebasings += 1;
                        warn!(
                            lineage = %lineage,
                            raw_delta = outcome.raw_delta,
                            "rebasing_detected: large downward restatement clamped to zero"
                        );
                    }
                    DeltaFlag::NegativeClamped => stats.negative_clamps += 1,
                }
            }
            debug!(lineage = %lineage, level, value = outcome.value, "level converted");

            // A stale report that is not an exact replay stays a level report:
            // its computed delta is audit-only and never becomes `value`.
            if let Some(value) = outcome.publishable_value() {
                rec.value = Some(value);
                rec.series_semantics = SeriesSemantics::New;
            }
            rec.method_details = Some(match rec.method_details.take() {
                Some(prev) if !prev.is_empty() => format!("{prev}; {}", outcome.method_details),
                _ => outcome.method_details.clone(),
            });
            rec.flags.extend(outcome.flags.iter().copied());
            out.push((idx, rec));
        }
    }

    (out, stats)
}
