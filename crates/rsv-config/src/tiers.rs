//! Tier rank table.
//!
//! # Invariants
//!
//! - **Total order**: every label has exactly one rank and no two labels share
//!   a rank. Lower rank = higher precedence.
//! - **Validated at load**: an empty table, a blank label, a duplicate label or
//!   a duplicate rank is rejected when the table is built, never at lookup.
//! - **Immutable**: there is no mutation API; a run shares one table by `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw YAML shape. Either an ordered list (rank = position, from 1) or an
/// explicit `label: rank` map.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TierSpec {
    Ordered(Vec<String>),
    Ranked(BTreeMap<String, u32>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TierTableError {
    Empty,
    BlankLabel { position: usize },
    DuplicateLabel(String),
    DuplicateRank { rank: u32, first: String, second: String },
}

impl std::fmt::Display for TierTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierTableError::Empty => write!(f, "TIER_TABLE_EMPTY: no tiers configured"),
            TierTableError::BlankLabel { position } => {
                write!(f, "TIER_TABLE_BLANK_LABEL: tier at position {position} has no label")
            }
            TierTableError::DuplicateLabel(label) => {
                write!(f, "TIER_TABLE_DUPLICATE_LABEL: '{label}' configured twice")
            }
            TierTableError::DuplicateRank { rank, first, second } => write!(
                f,
                "TIER_TABLE_DUPLICATE_RANK: rank {rank} assigned to both '{first}' and '{second}'"
            ),
        }
    }
}

impl std::error::Error for TierTableError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierTable {
    ranks: BTreeMap<String, u32>,
}

impl TierTable {
    /// Rank = 1-based position in `labels`.
    pub fn from_ordered<S: AsRef<str>>(labels: &[S]) -> Result<Self, TierTableError> {
        let pairs: Vec<(String, u32)> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_ref().to_string(), i as u32 + 1))
            .collect();
        Self::from_pairs(pairs)
    }

    pub fn from_spec(spec: &TierSpec) -> Result<Self, TierTableError> {
        match spec {
            TierSpec::Ordered(labels) => Self::from_ordered(labels),
            TierSpec::Ranked(map) => {
                Self::from_pairs(map.iter().map(|(l, r)| (l.clone(), *r)).collect())
            }
        }
    }

    fn from_pairs(pairs: Vec<(String, u32)>) -> Result<Self, TierTableError> {
        if pairs.is_empty() {
            return Err(TierTableError::Empty);
        }

        let mut ranks: BTreeMap<String, u32> = BTreeMap::new();
        let mut by_rank: BTreeMap<u32, String> = BTreeMap::new();

        for (position, (label, rank)) in pairs.into_iter().enumerate() {
            let label = label.trim().to_string();
            if label.is_empty() {
                return Err(TierTableError::BlankLabel { position });
            }
            if ranks.contains_key(&label) {
                return Err(TierTableError::DuplicateLabel(label));
            }
            if let Some(first) = by_rank.get(&rank) {
                return Err(TierTableError::DuplicateRank {
                    rank,
                    first: first.clone(),
                    second: label,
                });
            }
            by_rank.insert(rank, label.clone());
            ranks.insert(label, rank);
        }

        Ok(Self { ranks })
    }

    pub fn rank(&self, label: &str) -> Option<u32> {
        self.ranks.get(label.trim()).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.rank(label).is_some()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Labels sorted by rank (highest precedence first).
    pub fn labels_by_rank(&self) -> Vec<(&str, u32)> {
        let mut out: Vec<(&str, u32)> = self.ranks.iter().map(|(l, r)| (l.as_str(), *r)).collect();
        out.sort_by_key(|(_, r)| *r);
        out
    }
}
