use chrono::NaiveDate;
use rsv_overrides::InvalidOverride;
use rsv_schemas::{DeltaFlag, FactRecord, ResolutionKey};
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolvePolicy {
    /// Untraceable overrides are fatal instead of flagged `stale_override`.
    pub strict_overrides: bool,
}

/// Which step of the decision path produced the winner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecidedBy {
    Override,
    SingleCandidate,
    TierRank,
    AsOf,
    PublicationDate,
    Completeness,
    CompositeKey,
}

impl DecidedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecidedBy::Override => "override",
            DecidedBy::SingleCandidate => "single_candidate",
            DecidedBy::TierRank => "tier_rank",
            DecidedBy::AsOf => "as_of",
            DecidedBy::PublicationDate => "publication_date",
            DecidedBy::Completeness => "completeness",
            DecidedBy::CompositeKey => "composite_key",
        }
    }
}

/// Why a candidate lost. Carries the values compared so the audit row is
/// self-explanatory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    SupersededByOverride,
    LowerTierRank { rank: Option<u32>, winning_rank: u32 },
    OlderAsOf { as_of: NaiveDate, winning_as_of: NaiveDate },
    OlderPublicationDate {
        publication_date: Option<NaiveDate>,
        winning_publication_date: Option<NaiveDate>,
    },
    MissingValue,
    CompositeKeyOrder { composite_key: String, winning_composite_key: String },
    /// Same composite key as the winner; ordered by revision, then content.
    DuplicateCompositeKey { revision: u32, winning_revision: u32 },
}

impl RejectReason {
    pub fn describe(&self) -> String {
        match self {
            RejectReason::SupersededByOverride => "rejected: superseded by review override".into(),
            RejectReason::LowerTierRank { rank, winning_rank } => match rank {
                Some(r) => format!("rejected: lower tier rank ({r} vs {winning_rank})"),
                None => format!("rejected: lower tier rank (unranked vs {winning_rank})"),
            },
            RejectReason::OlderAsOf { as_of, winning_as_of } => {
                format!("rejected: older as_of ({as_of} vs {winning_as_of})")
            }
            RejectReason::OlderPublicationDate {
                publication_date,
                winning_publication_date,
            } => format!(
                "rejected: older publication_date ({} vs {})",
                fmt_opt_date(publication_date),
                fmt_opt_date(winning_publication_date)
            ),
            RejectReason::MissingValue => "rejected: missing value".into(),
            RejectReason::CompositeKeyOrder {
                composite_key,
                winning_composite_key,
            } => format!(
                "rejected: composite key ordering ('{composite_key}' after '{winning_composite_key}')"
            ),
            RejectReason::DuplicateCompositeKey {
                revision,
                winning_revision,
            } => format!(
                "rejected: duplicate composite key (revision {revision} vs {winning_revision})"
            ),
        }
    }
}

fn fmt_opt_date(d: &Option<NaiveDate>) -> String {
    d.map(|d| d.to_string()).unwrap_or_else(|| "none".to_string())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Chosen,
    /// Candidate backing a review override.
    MatchesOverride,
    Rejected(RejectReason),
}

/// One row per candidate considered for a key.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CandidateDiagnostic {
    pub source_id: String,
    pub event_id: String,
    pub tier: String,
    pub tier_rank: Option<u32>,
    pub as_of: NaiveDate,
    pub publication_date: Option<NaiveDate>,
    pub value: Option<u64>,
    pub composite_key: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub delta_flags: Vec<DeltaFlag>,
    pub outcome: CandidateOutcome,
    pub justification: String,
}

impl CandidateDiagnostic {
    pub fn is_chosen(&self) -> bool {
        matches!(
            self.outcome,
            CandidateOutcome::Chosen | CandidateOutcome::MatchesOverride
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionFlag {
    /// Override honored although no candidate carries its source and value.
    StaleOverride,
}

/// The canonical figure for one resolution key plus its decision trail.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedFact {
    pub key: ResolutionKey,
    pub value: Option<u64>,
    pub selected_source: String,
    pub selected_event_id: String,
    pub selected_as_of: NaiveDate,
    pub selected_tier: String,
    pub tier_rank: Option<u32>,
    pub decided_by: DecidedBy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_author: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<ResolutionFlag>,
    pub winner: FactRecord,
    /// Every candidate, best first.
    pub candidates: Vec<CandidateDiagnostic>,
}

impl ResolvedFact {
    pub fn has_flag(&self, flag: ResolutionFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn rejected(&self) -> impl Iterator<Item = &CandidateDiagnostic> {
        self.candidates.iter().filter(|c| !c.is_chosen())
    }
}

/// Run-aborting conditions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveError {
    UnknownTier {
        key: ResolutionKey,
        tier: String,
        source_id: String,
        event_id: String,
    },
    InvalidOverride(InvalidOverride),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::UnknownTier {
                key,
                tier,
                source_id,
                event_id,
            } => write!(
                f,
                "UNKNOWN_TIER key={key}: tier '{tier}' of {source_id}/{event_id} has no configured rank"
            ),
            ResolveError::InvalidOverride(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<InvalidOverride> for ResolveError {
    fn from(e: InvalidOverride) -> Self {
        ResolveError::InvalidOverride(e)
    }
}
