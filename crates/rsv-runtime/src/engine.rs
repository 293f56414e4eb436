use anyhow::Result;
use rsv_audit::{DiagnosticsWriter, LineSink};
use rsv_config::{ResolverConfig, TierTable};
use rsv_levels::{apply_levels, ConversionStats, LevelHistoryStore, StagedLevelStore};
use rsv_overrides::OverrideRegistry;
use rsv_precedence::{resolve, ResolutionFlag, ResolveError, ResolvePolicy, ResolvedFact};
use rsv_schemas::{FactRecord, ResolutionKey};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything a completed run produced. Nothing here is persisted by the run
/// itself; the caller decides what to publish.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub resolved: BTreeMap<ResolutionKey, ResolvedFact>,
    /// Candidate sets after level conversion, for diagnostics.
    pub candidates: BTreeMap<ResolutionKey, Vec<FactRecord>>,
    /// Keys that produced no output.
    pub unresolved: Vec<ResolutionKey>,
    pub conversion: ConversionStats,
    pub config_hash: String,
}

impl RunOutput {
    pub fn stale_overrides(&self) -> usize {
        self.resolved
            .values()
            .filter(|f| f.has_flag(ResolutionFlag::StaleOverride))
            .count()
    }

    pub fn report(&self, run_id: Uuid) -> RunReport<'_> {
        RunReport {
            schema_version: 1,
            run_id,
            config_hash: &self.config_hash,
            conversion: &self.conversion,
            unresolved: self.unresolved.iter().map(|k| k.to_string()).collect(),
            facts: self.resolved.values().collect(),
        }
    }
}

/// Serializable summary handed to the export layer. Carries no wall-clock
/// time: the same run id over the same input serializes to the same bytes.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub schema_version: i32,
    pub run_id: Uuid,
    pub config_hash: &'a str,
    pub conversion: &'a ConversionStats,
    pub unresolved: Vec<String>,
    pub facts: Vec<&'a ResolvedFact>,
}

/// Fail fast on candidates whose tier has no configured rank. Keys that carry
/// an override skip this check, as resolution never ranks them.
pub fn preflight(
    facts: &[FactRecord],
    tiers: &TierTable,
    overrides: &OverrideRegistry,
) -> Result<(), ResolveError> {
    let first_unknown = facts
        .iter()
        .filter(|f| !tiers.contains(&f.tier))
        .map(|f| (f.resolution_key(), f))
        .filter(|(key, _)| overrides.lookup(key).is_none())
        .min_by(|(ka, a), (kb, b)| {
            ka.cmp(kb)
                .then_with(|| a.composite_key().cmp(&b.composite_key()))
        });

    match first_unknown {
        None => Ok(()),
        Some((key, f)) => Err(ResolveError::UnknownTier {
            key,
            tier: f.tier.clone(),
            source_id: f.source_id.clone(),
            event_id: f.event_id.clone(),
        }),
    }
}

pub fn run(
    facts: Vec<FactRecord>,
    config: &ResolverConfig,
    overrides: &OverrideRegistry,
    store: &dyn LevelHistoryStore,
) -> Result<RunOutput, ResolveError> {
    info!(
        facts = facts.len(),
        overrides = overrides.len(),
        workers = config.workers,
        config_hash = %config.config_hash,
        "resolution run starting"
    );
    for rejected in overrides.rejected() {
        warn!(%rejected, "override skipped");
    }

    preflight(&facts, &config.tiers, overrides)?;

    // Level moves are staged and only reach `store` once every key resolved.
    let staged = StagedLevelStore::new(store);
    let conversion = apply_levels(facts, &staged, config.workers);
    let candidates = group_by_key(conversion.records, overrides);
    let policy = ResolvePolicy {
        strict_overrides: config.strict_overrides,
    };

    let outcomes = resolve_all(&candidates, &config.tiers, overrides, policy, config.workers);

    let mut resolved = BTreeMap::new();
    let mut unresolved = Vec::new();
    for (key, outcome) in outcomes {
        match outcome? {
            Some(fact) => {
                if fact.has_flag(ResolutionFlag::StaleOverride) {
                    warn!(key = %key, source = %fact.selected_source, "stale_override: no candidate backs the override");
                }
                debug!(key = %key, decided_by = fact.decided_by.as_str(), value = ?fact.value, "resolved");
                resolved.insert(key, fact);
            }
            None => unresolved.push(key),
        }
    }

    let lineages = staged.commit();
    debug!(lineages, "level history committed");

    let out = RunOutput {
        resolved,
        candidates,
        unresolved,
        conversion: conversion.stats,
        config_hash: config.config_hash.clone(),
    };
    info!(
        resolved = out.resolved.len(),
        unresolved = out.unresolved.len(),
        stale_overrides = out.stale_overrides(),
        converted = out.conversion.converted,
        "resolution run complete"
    );
    Ok(out)
}

/// Override keys are included even with no candidates so the override is
/// still honored (or rejected in strict mode).
fn group_by_key(
    records: Vec<FactRecord>,
    overrides: &OverrideRegistry,
) -> BTreeMap<ResolutionKey, Vec<FactRecord>> {
    let mut groups: BTreeMap<ResolutionKey, Vec<FactRecord>> = BTreeMap::new();
    for rec in records {
        groups.entry(rec.resolution_key()).or_default().push(rec);
    }
    for entry in overrides.iter() {
        groups.entry(entry.key.clone()).or_default();
    }
    groups
}

type Outcome = Result<Option<ResolvedFact>, ResolveError>;

/// Resolve every key on `workers` scoped threads. Results come back in key
/// order regardless of which worker handled them.
fn resolve_all(
    groups: &BTreeMap<ResolutionKey, Vec<FactRecord>>,
    tiers: &TierTable,
    overrides: &OverrideRegistry,
    policy: ResolvePolicy,
    workers: usize,
) -> BTreeMap<ResolutionKey, Outcome> {
    let items: Vec<(&ResolutionKey, &Vec<FactRecord>)> = groups.iter().collect();
    if items.is_empty() {
        return BTreeMap::new();
    }
    let chunk = items.len().div_ceil(workers.max(1));

    std::thread::scope(|s| {
        let handles: Vec<_> = items
            .chunks(chunk)
            .map(|slice| {
                s.spawn(move || {
                    slice
                        .iter()
                        .map(|(key, cands)| {
                            ((*key).clone(), resolve(key, cands, tiers, overrides, policy))
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| match h.join() {
                Ok(r) => r,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

/// Append the diagnostics of a completed run, key by key in key order.
pub fn emit_diagnostics<S: LineSink>(
    output: &RunOutput,
    run_id: Uuid,
    writer: &mut DiagnosticsWriter<S>,
) -> Result<usize> {
    let mut rows = 0;
    for (key, candidates) in &output.candidates {
        let written = writer.record(run_id, key, output.resolved.get(key), candidates)?;
        rows += written.len();
    }
    info!(run_id = %run_id, rows, "diagnostics recorded");
    Ok(rows)
}
