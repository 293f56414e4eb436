//! rsv-overrides
//!
//! Human review decisions that supersede automated resolution for one
//! resolution key.
//!
//! - Every entry carries a non-empty justification note.
//! - For a key, the entry with the latest timestamp supersedes earlier ones;
//!   a revoked entry removes the key.
//! - The registry is built once per run and has no mutation API afterwards.

mod load;

pub use load::{load_overrides_csv, parse_overrides_csv};

use chrono::{DateTime, Utc};
use rsv_schemas::ResolutionKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub key: ResolutionKey,
    pub chosen_source: String,
    pub chosen_value: u64,
    pub note: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InvalidOverrideReason {
    EmptyNote,
    EmptySource,
    /// No candidate matches the chosen source and value.
    Untraceable { chosen_source: String, chosen_value: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidOverride {
    pub key: ResolutionKey,
    pub reason: InvalidOverrideReason,
}

impl std::fmt::Display for InvalidOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            InvalidOverrideReason::EmptyNote => {
                write!(f, "INVALID_OVERRIDE key={}: justification note is empty", self.key)
            }
            InvalidOverrideReason::EmptySource => {
                write!(f, "INVALID_OVERRIDE key={}: chosen source is empty", self.key)
            }
            InvalidOverrideReason::Untraceable {
                chosen_source,
                chosen_value,
            } => write!(
                f,
                "INVALID_OVERRIDE key={}: no candidate from '{}' with value {}",
                self.key, chosen_source, chosen_value
            ),
        }
    }
}

impl std::error::Error for InvalidOverride {}

/// Structural checks that do not depend on the candidate set.
pub fn validate(entry: &OverrideEntry) -> Result<(), InvalidOverride> {
    let reason = if entry.note.trim().is_empty() {
        InvalidOverrideReason::EmptyNote
    } else if entry.chosen_source.trim().is_empty() {
        InvalidOverrideReason::EmptySource
    } else {
        return Ok(());
    };
    Err(InvalidOverride {
        key: entry.key.clone(),
        reason,
    })
}

#[derive(Clone, Debug, Default)]
pub struct OverrideRegistry {
    active: BTreeMap<ResolutionKey, OverrideEntry>,
    rejected: Vec<InvalidOverride>,
}

impl OverrideRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the active set.
    ///
    /// `strict`: the first invalid entry aborts. Otherwise invalid entries are
    /// skipped and kept in [`OverrideRegistry::rejected`].
    pub fn from_entries(
        entries: impl IntoIterator<Item = OverrideEntry>,
        strict: bool,
    ) -> Result<Self, InvalidOverride> {
        let mut entries: Vec<OverrideEntry> = entries.into_iter().collect();
        // Stable: equal timestamps keep input order, so the later row wins.
        entries.sort_by_key(|e| e.timestamp);

        let mut active = BTreeMap::new();
        let mut rejected = Vec::new();

        for entry in entries {
            if let Err(e) = validate(&entry) {
                if strict {
                    return Err(e);
                }
                rejected.push(e);
                continue;
            }
            if entry.revoked {
                active.remove(&entry.key);
            } else {
                active.insert(entry.key.clone(), entry);
            }
        }

        Ok(Self { active, rejected })
    }

    pub fn lookup(&self, key: &ResolutionKey) -> Option<&OverrideEntry> {
        self.active.get(key)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OverrideEntry> {
        self.active.values()
    }

    pub fn rejected(&self) -> &[InvalidOverride] {
        &self.rejected
    }
}
