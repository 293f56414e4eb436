//! Staging overlay over a level store.
//!
//! Reads fall through to the base store; writes are buffered per lineage and
//! reach the base only on [`StagedLevelStore::commit`]. Dropping the overlay
//! discards every buffered write, so a run that aborts leaves the base
//! untouched.

use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::Mutex;
use rsv_schemas::{LineageKey, YearMonth};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::delta::{evaluate_delta, DeltaOutcome, LevelHistoryEntry, LevelPolicy};
use crate::store::LevelHistoryStore;

pub struct StagedLevelStore<'a> {
    base: &'a dyn LevelHistoryStore,
    staged: DashMap<LineageKey, LevelHistoryEntry>,
    writers: DashMap<LineageKey, Arc<Mutex<()>>>,
}

impl<'a> StagedLevelStore<'a> {
    pub fn new(base: &'a dyn LevelHistoryStore) -> Self {
        Self {
            base,
            staged: DashMap::new(),
            writers: DashMap::new(),
        }
    }

    /// Number of lineages with a buffered write.
    pub fn pending(&self) -> usize {
        self.staged.len()
    }

    /// Push buffered entries to the base store in lineage order. Returns the
    /// number of lineages written.
    pub fn commit(self) -> usize {
        let ordered: BTreeMap<LineageKey, LevelHistoryEntry> = self.staged.into_iter().collect();
        let n = ordered.len();
        for (lineage, entry) in ordered {
            self.base.put(&lineage, entry);
        }
        n
    }

    fn writer_lock(&self, lineage: &LineageKey) -> Arc<Mutex<()>> {
        self.writers.entry(lineage.clone()).or_default().clone()
    }
}

impl LevelHistoryStore for StagedLevelStore<'_> {
    fn get_last(&self, lineage: &LineageKey) -> Option<LevelHistoryEntry> {
        match self.staged.get(lineage) {
            Some(e) => Some(e.value().clone()),
            None => self.base.get_last(lineage),
        }
    }

    fn policy(&self) -> LevelPolicy {
        self.base.policy()
    }

    fn put(&self, lineage: &LineageKey, entry: LevelHistoryEntry) {
        let lock = self.writer_lock(lineage);
        let _guard = lock.lock();
        self.staged.insert(lineage.clone(), entry);
    }

    fn compute_delta(
        &self,
        lineage: &LineageKey,
        new_level: u64,
        new_as_of: NaiveDate,
        new_month: YearMonth,
    ) -> DeltaOutcome {
        let lock = self.writer_lock(lineage);
        let _guard = lock.lock();

        let prior = self.get_last(lineage);
        let (outcome, commit) =
            evaluate_delta(prior.as_ref(), new_level, new_as_of, new_month, self.policy());
        if let Some(entry) = commit {
            self.staged.insert(lineage.clone(), entry);
        }
        outcome
    }
}
