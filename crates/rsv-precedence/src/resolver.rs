use rsv_config::TierTable;
use rsv_overrides::{InvalidOverride, InvalidOverrideReason, OverrideEntry, OverrideRegistry};
use rsv_schemas::{FactRecord, ResolutionKey, REVIEW_OVERRIDE_SOURCE};
use std::cmp::Ordering;

use crate::types::{
    CandidateDiagnostic, CandidateOutcome, DecidedBy, RejectReason, ResolutionFlag, ResolveError,
    ResolvePolicy, ResolvedFact,
};

/// Comparison steps in precedence order. The first three after `Tier` are the
/// tie-break ladder; `Revision` and `Content` only separate records whose
/// composite keys collide, so exact duplicates still order the same way on
/// every run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Tier,
    AsOf,
    PublicationDate,
    Completeness,
    CompositeKey,
    Revision,
    Content,
}

struct Ranked<'a> {
    record: &'a FactRecord,
    rank: Option<u32>,
    composite_key: String,
    canonical: String,
}

impl<'a> Ranked<'a> {
    fn new(record: &'a FactRecord, rank: Option<u32>) -> Self {
        Self {
            record,
            rank,
            composite_key: record.composite_key(),
            canonical: serde_json::to_string(record).unwrap_or_default(),
        }
    }
}

/// First step at which `a` and `b` differ. `Less` means `a` takes precedence.
fn first_difference(a: &Ranked<'_>, b: &Ranked<'_>) -> Option<(Step, Ordering)> {
    let (ra, rb) = (a.record, b.record);
    [
        (
            Step::Tier,
            a.rank.unwrap_or(u32::MAX).cmp(&b.rank.unwrap_or(u32::MAX)),
        ),
        (Step::AsOf, rb.as_of.cmp(&ra.as_of)),
        (
            Step::PublicationDate,
            rb.publication_date.cmp(&ra.publication_date),
        ),
        (Step::Completeness, rb.has_value().cmp(&ra.has_value())),
        (Step::CompositeKey, a.composite_key.cmp(&b.composite_key)),
        (Step::Revision, rb.revision.cmp(&ra.revision)),
        (Step::Content, a.canonical.cmp(&b.canonical)),
    ]
    .into_iter()
    .find(|(_, o)| *o != Ordering::Equal)
}

fn precedence_cmp(a: &Ranked<'_>, b: &Ranked<'_>) -> Ordering {
    first_difference(a, b)
        .map(|(_, o)| o)
        .unwrap_or(Ordering::Equal)
}

fn decided_by(step: Option<Step>) -> DecidedBy {
    match step {
        Some(Step::Tier) => DecidedBy::TierRank,
        Some(Step::AsOf) => DecidedBy::AsOf,
        Some(Step::PublicationDate) => DecidedBy::PublicationDate,
        Some(Step::Completeness) => DecidedBy::Completeness,
        Some(Step::CompositeKey) | Some(Step::Revision) | Some(Step::Content) | None => {
            DecidedBy::CompositeKey
        }
    }
}

fn reject_reason(loser: &Ranked<'_>, winner: &Ranked<'_>) -> RejectReason {
    let (l, w) = (loser.record, winner.record);
    match first_difference(loser, winner).map(|(s, _)| s) {
        Some(Step::Tier) => RejectReason::LowerTierRank {
            rank: loser.rank,
            winning_rank: winner.rank.unwrap_or(u32::MAX),
        },
        Some(Step::AsOf) => RejectReason::OlderAsOf {
            as_of: l.as_of,
            winning_as_of: w.as_of,
        },
        Some(Step::PublicationDate) => RejectReason::OlderPublicationDate {
            publication_date: l.publication_date,
            winning_publication_date: w.publication_date,
        },
        Some(Step::Completeness) => RejectReason::MissingValue,
        Some(Step::CompositeKey) => RejectReason::CompositeKeyOrder {
            composite_key: loser.composite_key.clone(),
            winning_composite_key: winner.composite_key.clone(),
        },
        Some(Step::Revision) | Some(Step::Content) | None => RejectReason::DuplicateCompositeKey {
            revision: l.revision,
            winning_revision: w.revision,
        },
    }
}

fn diagnostic(r: &Ranked<'_>, outcome: CandidateOutcome, justification: String) -> CandidateDiagnostic {
    let rec = r.record;
    CandidateDiagnostic {
        source_id: rec.source_id.clone(),
        event_id: rec.event_id.clone(),
        tier: rec.tier.clone(),
        tier_rank: r.rank,
        as_of: rec.as_of,
        publication_date: rec.publication_date,
        value: rec.value,
        composite_key: r.composite_key.clone(),
        delta_flags: rec.flags.clone(),
        outcome,
        justification,
    }
}

/// Select the canonical record for `key`.
///
/// - An override for `key` wins outright; candidates are still listed.
/// - Otherwise only the best tier rank survives, then the tie-break ladder
///   (latest `as_of`, latest `publication_date`, non-null value, smallest
///   composite key) picks one.
/// - No candidates and no override → `Ok(None)`.
///
/// The result does not depend on the order of `candidates`.
pub fn resolve(
    key: &ResolutionKey,
    candidates: &[FactRecord],
    tiers: &TierTable,
    overrides: &OverrideRegistry,
    policy: ResolvePolicy,
) -> Result<Option<ResolvedFact>, ResolveError> {
    if let Some(entry) = overrides.lookup(key) {
        return resolve_by_override(key, candidates, tiers, entry, policy).map(Some);
    }
    if candidates.is_empty() {
        return Ok(None);
    }

    check_tiers(key, candidates, tiers)?;

    let mut ranked: Vec<Ranked<'_>> = candidates
        .iter()
        .map(|r| Ranked::new(r, tiers.rank(&r.tier)))
        .collect();
    ranked.sort_by(precedence_cmp);

    let winner = &ranked[0];
    let decided = match ranked.get(1) {
        None => DecidedBy::SingleCandidate,
        Some(runner_up) => decided_by(first_difference(winner, runner_up).map(|(s, _)| s)),
    };
    let winning_rank = winner.rank.unwrap_or(u32::MAX);

    let diagnostics = ranked
        .iter()
        .enumerate()
        .map(|(i, r)| {
            if i == 0 {
                diagnostic(
                    r,
                    CandidateOutcome::Chosen,
                    format!(
                        "chosen: tier rank {}; decided by {}",
                        winning_rank,
                        decided.as_str()
                    ),
                )
            } else {
                let reason = reject_reason(r, winner);
                let text = reason.describe();
                diagnostic(r, CandidateOutcome::Rejected(reason), text)
            }
        })
        .collect();

    let w = winner.record;
    Ok(Some(ResolvedFact {
        key: key.clone(),
        value: w.value,
        selected_source: w.source_id.clone(),
        selected_event_id: w.event_id.clone(),
        selected_as_of: w.as_of,
        selected_tier: w.tier.clone(),
        tier_rank: winner.rank,
        decided_by: decided,
        override_note: None,
        override_author: None,
        flags: Vec::new(),
        winner: w.clone(),
        candidates: diagnostics,
    }))
}

/// Every candidate tier must be configured. Reports the unknown candidate
/// with the smallest composite key so the error is stable across input order.
fn check_tiers(
    key: &ResolutionKey,
    candidates: &[FactRecord],
    tiers: &TierTable,
) -> Result<(), ResolveError> {
    let unknown = candidates
        .iter()
        .filter(|r| !tiers.contains(&r.tier))
        .min_by(|a, b| {
            a.composite_key()
                .cmp(&b.composite_key())
                .then_with(|| a.tier.cmp(&b.tier))
        });

    match unknown {
        None => Ok(()),
        Some(r) => Err(ResolveError::UnknownTier {
            key: key.clone(),
            tier: r.tier.clone(),
            source_id: r.source_id.clone(),
            event_id: r.event_id.clone(),
        }),
    }
}

fn resolve_by_override(
    key: &ResolutionKey,
    candidates: &[FactRecord],
    tiers: &TierTable,
    entry: &OverrideEntry,
    policy: ResolvePolicy,
) -> Result<ResolvedFact, ResolveError> {
    // Ranks are informational here; unknown tiers do not abort an override.
    let mut ranked: Vec<Ranked<'_>> = candidates
        .iter()
        .map(|r| Ranked::new(r, tiers.rank(&r.tier)))
        .collect();
    ranked.sort_by(precedence_cmp);

    let matched = ranked.iter().position(|r| {
        r.record.source_id == entry.chosen_source && r.record.value == Some(entry.chosen_value)
    });

    let mut flags = Vec::new();
    if matched.is_none() {
        if policy.strict_overrides {
            return Err(InvalidOverride {
                key: key.clone(),
                reason: InvalidOverrideReason::Untraceable {
                    chosen_source: entry.chosen_source.clone(),
                    chosen_value: entry.chosen_value,
                },
            }
            .into());
        }
        flags.push(ResolutionFlag::StaleOverride);
    }

    let diagnostics = ranked
        .iter()
        .enumerate()
        .map(|(i, r)| {
            if Some(i) == matched {
                diagnostic(
                    r,
                    CandidateOutcome::MatchesOverride,
                    format!("chosen: matches review override by {}", entry.author),
                )
            } else {
                let reason = RejectReason::SupersededByOverride;
                let text = reason.describe();
                diagnostic(r, CandidateOutcome::Rejected(reason), text)
            }
        })
        .collect();

    let (winner, tier_rank) = match matched {
        Some(i) => (ranked[i].record.clone(), ranked[i].rank),
        None => (synthesize_override_record(key, entry), None),
    };

    Ok(ResolvedFact {
        key: key.clone(),
        value: Some(entry.chosen_value),
        selected_source: winner.source_id.clone(),
        selected_event_id: winner.event_id.clone(),
        selected_as_of: winner.as_of,
        selected_tier: winner.tier.clone(),
        tier_rank,
        decided_by: DecidedBy::Override,
        override_note: Some(entry.note.clone()),
        override_author: Some(entry.author.clone()),
        flags,
        winner,
        candidates: diagnostics,
    })
}

fn synthesize_override_record(key: &ResolutionKey, entry: &OverrideEntry) -> FactRecord {
    let mut rec = FactRecord::new(
        REVIEW_OVERRIDE_SOURCE,
        format!("override:{}", entry.timestamp.to_rfc3339()),
        key,
        REVIEW_OVERRIDE_SOURCE,
        entry.timestamp.date_naive(),
    )
    .with_value(entry.chosen_value);
    rec.definition_text = entry.note.clone();
    rec.method_details = Some(format!(
        "review_override(author={},chosen_source={})",
        entry.author, entry.chosen_source
    ));
    rec
}
