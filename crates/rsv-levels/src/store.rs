//! Keyed level stores.
//!
//! Concurrency contract:
//! - Writes to one lineage are serialized by a per-lineage writer lock. Two
//!   writers on different lineages never wait on each other's writer lock.
//! - Committed entries are replaced whole; a reader sees either the previous
//!   entry or the new one, never a partial write. Readers do not take the
//!   writer lock.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::Mutex;
use rsv_schemas::{LineageKey, YearMonth};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::delta::{evaluate_delta, DeltaOutcome, LevelHistoryEntry, LevelPolicy};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

pub trait LevelHistoryStore: Send + Sync {
    fn get_last(&self, lineage: &LineageKey) -> Option<LevelHistoryEntry>;

    fn policy(&self) -> LevelPolicy;

    /// Replace the committed entry of `lineage` whole.
    fn put(&self, lineage: &LineageKey, entry: LevelHistoryEntry);

    /// Convert `new_level` into a monthly delta and advance the lineage when
    /// `new_month` is strictly after the stored month.
    fn compute_delta(
        &self,
        lineage: &LineageKey,
        new_level: u64,
        new_as_of: NaiveDate,
        new_month: YearMonth,
    ) -> DeltaOutcome;
}

#[derive(Debug, Default)]
pub struct InMemoryLevelStore {
    committed: DashMap<LineageKey, LevelHistoryEntry>,
    writers: DashMap<LineageKey, Arc<Mutex<()>>>,
    policy: LevelPolicy,
}

impl InMemoryLevelStore {
    pub fn new(policy: LevelPolicy) -> Self {
        Self {
            committed: DashMap::new(),
            writers: DashMap::new(),
            policy,
        }
    }

    pub fn with_entries(
        policy: LevelPolicy,
        entries: impl IntoIterator<Item = (LineageKey, LevelHistoryEntry)>,
    ) -> Self {
        let store = Self::new(policy);
        for (k, v) in entries {
            store.committed.insert(k, v);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    /// Ordered copy of every committed entry.
    pub fn snapshot(&self) -> BTreeMap<LineageKey, LevelHistoryEntry> {
        self.committed
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    fn writer_lock(&self, lineage: &LineageKey) -> Arc<Mutex<()>> {
        // The shard guard from `entry` is dropped at the end of this statement,
        // before the caller blocks on the returned mutex.
        self.writers.entry(lineage.clone()).or_default().clone()
    }
}

impl LevelHistoryStore for InMemoryLevelStore {
    fn get_last(&self, lineage: &LineageKey) -> Option<LevelHistoryEntry> {
        self.committed.get(lineage).map(|e| e.value().clone())
    }

    fn policy(&self) -> LevelPolicy {
        self.policy
    }

    fn put(&self, lineage: &LineageKey, entry: LevelHistoryEntry) {
        let lock = self.writer_lock(lineage);
        let _guard = lock.lock();
        self.committed.insert(lineage.clone(), entry);
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
            evaluate_delta(prior.as_ref(), new_level, new_as_of, new_month, self.policy);
        if let Some(entry) = commit {
            self.committed.insert(lineage.clone(), entry);
        }
        outcome
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    schema_version: u32,
    entries: Vec<SnapshotRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRow {
    lineage: LineageKey,
    #[serde(flatten)]
    entry: LevelHistoryEntry,
}

/// In-memory store loaded from, and saved back to, a JSON snapshot.
///
/// Mutations stay in memory until [`FileLevelStore::save`]; a run that
/// aborts simply never saves.
#[derive(Debug)]
pub struct FileLevelStore {
    path: PathBuf,
    inner: InMemoryLevelStore,
}

impl FileLevelStore {
    /// Missing file = empty history.
    pub fn open(path: impl AsRef<Path>, policy: LevelPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("read level snapshot {:?}", path))?;
            let file: SnapshotFile = serde_json::from_str(&raw)
                .with_context(|| format!("parse level snapshot {:?}", path))?;
            if file.schema_version != SNAPSHOT_SCHEMA_VERSION {
                anyhow::bail!(
                    "LEVEL_SNAPSHOT_VERSION: {:?} has schema_version={}, expected {}",
                    path,
                    file.schema_version,
                    SNAPSHOT_SCHEMA_VERSION
                );
            }
            InMemoryLevelStore::with_entries(
                policy,
                file.entries.into_iter().map(|r| (r.lineage, r.entry)),
            )
        } else {
            InMemoryLevelStore::new(policy)
        };
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> BTreeMap<LineageKey, LevelHistoryEntry> {
        self.inner.snapshot()
    }

    /// Write the snapshot atomically (temp file + rename). Rows are sorted by
    /// lineage so identical state produces identical bytes.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create_dir_all {:?}", parent))?;
            }
        }

        let file = SnapshotFile {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            entries: self
                .inner
                .snapshot()
                .into_iter()
                .map(|(lineage, entry)| SnapshotRow { lineage, entry })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file).context("serialize level snapshot failed")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, format!("{json}\n")).with_context(|| format!("write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("rename {:?} -> {:?}", tmp, self.path))?;
        Ok(())
    }
}

impl LevelHistoryStore for FileLevelStore {
    fn get_last(&self, lineage: &LineageKey) -> Option<LevelHistoryEntry> {
        self.inner.get_last(lineage)
    }

    fn policy(&self) -> LevelPolicy {
        self.inner.policy()
    }

    fn put(&self, lineage: &LineageKey, entry: LevelHistoryEntry) {
        self.inner.put(lineage, entry)
    }

    fn compute_delta(
        &self,
        lineage: &LineageKey,
        new_level: u64,
        new_as_of: NaiveDate,
        new_month: YearMonth,
    ) -> DeltaOutcome {
        self.inner
            .compute_delta(lineage, new_level, new_as_of, new_month)
    }
}
