//! rsv-audit
//!
//! Diagnostics Emitter: an append-only, hash-chained JSON Lines log with one
//! row per (resolution key, candidate) and one decision row per key.
//!
//! Rows are keyed by `run_id` and resolution key so two runs over the same
//! log can be diffed with [`diff_runs`]. Nothing ever rewrites a prior line.

mod chain;
mod diff;
mod sink;

pub use chain::{compute_event_hash, verify_hash_chain, verify_hash_chain_str, VerifyResult};
pub use diff::{diff_runs, DecisionChange, RunDiff};
pub use sink::{FileSink, LineSink, MemorySink};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rsv_precedence::{CandidateDiagnostic, DecidedBy, ResolutionFlag, ResolvedFact};
use rsv_schemas::{FactRecord, ResolutionKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Candidate,
    Decision,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    /// Resolution key in `ISO3|HAZARD|YYYY-MM|metric` form.
    pub key: String,
    pub kind: EventKind,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

#[derive(Serialize)]
struct CandidateRow<'a> {
    #[serde(flatten)]
    diagnostic: &'a CandidateDiagnostic,
    chosen: bool,
}

#[derive(Serialize)]
struct DecisionRow<'a> {
    value: Option<u64>,
    selected_source: &'a str,
    selected_event_id: &'a str,
    selected_as_of: NaiveDate,
    selected_tier: &'a str,
    tier_rank: Option<u32>,
    decided_by: DecidedBy,
    #[serde(skip_serializing_if = "Option::is_none")]
    override_note: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    override_author: Option<&'a str>,
    #[serde(skip_serializing_if = "no_flags")]
    flags: &'a [ResolutionFlag],
    candidate_count: usize,
}

fn no_flags(flags: &&[ResolutionFlag]) -> bool {
    flags.is_empty()
}

#[derive(Serialize)]
struct UnresolvedRow<'a> {
    source_id: &'a str,
    event_id: &'a str,
    tier: &'a str,
    as_of: NaiveDate,
    value: Option<u64>,
    justification: &'static str,
}

/// Append-only diagnostics writer with a SHA-256 hash chain.
pub struct DiagnosticsWriter<S: LineSink> {
    sink: S,
    last_hash: Option<String>,
    /// Number of events already in the log; feeds `event_id` derivation.
    seq: u64,
}

impl DiagnosticsWriter<FileSink> {
    /// Open (or create) a log file and continue its chain.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut writer = Self::new(FileSink::new(path)?);
        if path.exists() {
            let content =
                fs::read_to_string(path).with_context(|| format!("read diagnostics {:?}", path))?;
            let events = read_events_str(&content)?;
            if let Some(last) = events.last() {
                writer.last_hash = last.hash_self.clone();
                writer.seq = last.seq + 1;
            }
        }
        Ok(writer)
    }
}

impl<S: LineSink> DiagnosticsWriter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            last_hash: None,
            seq: 0,
        }
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Record the outcome for one resolution key.
    ///
    /// With a resolved fact: one candidate row per diagnostic (best first)
    /// followed by the decision row. Without one: one row per raw candidate
    /// and a terminal `unresolved` row.
    pub fn record(
        &mut self,
        run_id: Uuid,
        key: &ResolutionKey,
        resolved: Option<&ResolvedFact>,
        candidates: &[FactRecord],
    ) -> Result<Vec<DiagnosticEvent>> {
        let key_str = key.to_string();
        let mut written = Vec::new();

        match resolved {
            Some(fact) => {
                for diagnostic in &fact.candidates {
                    let row = CandidateRow {
                        diagnostic,
                        chosen: diagnostic.is_chosen(),
                    };
                    written.push(self.append(run_id, &key_str, EventKind::Candidate, &row)?);
                }
                let decision = DecisionRow {
                    value: fact.value,
                    selected_source: &fact.selected_source,
                    selected_event_id: &fact.selected_event_id,
                    selected_as_of: fact.selected_as_of,
                    selected_tier: &fact.selected_tier,
                    tier_rank: fact.tier_rank,
                    decided_by: fact.decided_by,
                    override_note: fact.override_note.as_deref(),
                    override_author: fact.override_author.as_deref(),
                    flags: &fact.flags,
                    candidate_count: fact.candidates.len(),
                };
                written.push(self.append(run_id, &key_str, EventKind::Decision, &decision)?);
            }
            None => {
                for c in candidates {
                    let row = UnresolvedRow {
                        source_id: &c.source_id,
                        event_id: &c.event_id,
                        tier: &c.tier,
                        as_of: c.as_of,
                        value: c.value,
                        justification: "unresolved: no decision produced",
                    };
                    written.push(self.append(run_id, &key_str, EventKind::Candidate, &row)?);
                }
                let row = serde_json::json!({ "candidate_count": candidates.len() });
                written.push(self.append(run_id, &key_str, EventKind::Unresolved, &row)?);
            }
        }

        Ok(written)
    }

    fn append<T: Serialize>(
        &mut self,
        run_id: Uuid,
        key: &str,
        kind: EventKind,
        payload: &T,
    ) -> Result<DiagnosticEvent> {
        let payload = serde_json::to_value(payload).context("serialize diagnostics row failed")?;
        let event_id = derive_event_id(self.last_hash.as_deref(), &payload, self.seq)?;

        let mut ev = DiagnosticEvent {
            event_id,
            run_id,
            seq: self.seq,
            ts_utc: Utc::now(),
            key: key.to_string(),
            kind,
            payload,
            hash_prev: self.last_hash.clone(),
            hash_self: None,
        };
        let hash = compute_event_hash(&ev)?;
        ev.hash_self = Some(hash.clone());

        self.sink.append_line(&chain::canonical_json_line(&ev)?)?;
        self.last_hash = Some(hash);
        self.seq += 1;
        Ok(ev)
    }
}

/// UUID v5 over chain state, canonical payload and sequence number. No RNG,
/// so the same log prefix always yields the same ids.
fn derive_event_id(prev_hash: Option<&str>, payload: &Value, seq: u64) -> Result<Uuid> {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.unwrap_or("GENESIS").as_bytes());
    hasher.update(b"|");
    hasher.update(chain::canonical_json_line(payload)?.as_bytes());
    hasher.update(b"|");
    hasher.update(seq.to_be_bytes());
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, &hasher.finalize()))
}

pub fn read_events_str(content: &str) -> Result<Vec<DiagnosticEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str(l.trim())
                .with_context(|| format!("parse diagnostics event at line {}", i + 1))
        })
        .collect()
}

/// All events of one run, in log order.
pub fn read_run(path: impl AsRef<Path>, run_id: Uuid) -> Result<Vec<DiagnosticEvent>> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("read diagnostics {:?}", path))?;
    Ok(read_events_str(&content)?
        .into_iter()
        .filter(|e| e.run_id == run_id)
        .collect())
}

/// Distinct run ids in order of first appearance.
pub fn run_ids(events: &[DiagnosticEvent]) -> Vec<Uuid> {
    let mut seen = Vec::new();
    for e in events {
        if !seen.contains(&e.run_id) {
            seen.push(e.run_id);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_id_is_deterministic() {
        let a = derive_event_id(Some("abc"), &json!({"b": 1, "a": 2}), 3).unwrap();
        let b = derive_event_id(Some("abc"), &json!({"a": 2, "b": 1}), 3).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, derive_event_id(Some("abc"), &json!({"a": 2, "b": 1}), 4).unwrap());
        assert_ne!(a, derive_event_id(None, &json!({"a": 2, "b": 1}), 3).unwrap());
    }

    #[test]
    fn unresolved_key_writes_terminal_row() {
        let mut w = DiagnosticsWriter::new(MemorySink::new());
        let key = ResolutionKey::new("COL", "CU", "2025-02".parse().unwrap(), "pin_new");
        let rows = w.record(Uuid::nil(), &key, None, &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, EventKind::Unresolved);
        assert_eq!(rows[0].key, "COL|CU|2025-02|pin_new");
        assert_eq!(w.seq(), 1);
        assert_eq!(w.sink().lines().len(), 1);
    }
}
