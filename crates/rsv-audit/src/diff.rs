use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{DiagnosticEvent, EventKind};

/// A key whose decision differs between two runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionChange {
    pub key: String,
    pub before: Value,
    pub after: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunDiff {
    /// Keys decided only in the later run.
    pub added: Vec<String>,
    /// Keys decided only in the earlier run.
    pub removed: Vec<String>,
    pub changed: Vec<DecisionChange>,
    pub unchanged: usize,
}

impl RunDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

fn decisions(events: &[DiagnosticEvent]) -> BTreeMap<&str, &Value> {
    events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Decision | EventKind::Unresolved))
        .map(|e| (e.key.as_str(), &e.payload))
        .collect()
}

/// Compare the terminal decision row of every key. Candidate rows and
/// timestamps are ignored; keys come out sorted.
pub fn diff_runs(before: &[DiagnosticEvent], after: &[DiagnosticEvent]) -> RunDiff {
    let a = decisions(before);
    let b = decisions(after);
    let mut diff = RunDiff::default();

    for (key, before_payload) in &a {
        match b.get(key) {
            None => diff.removed.push(key.to_string()),
            Some(after_payload) if after_payload != before_payload => {
                diff.changed.push(DecisionChange {
                    key: key.to_string(),
                    before: (*before_payload).clone(),
                    after: (*after_payload).clone(),
                })
            }
            Some(_) => diff.unchanged += 1,
        }
    }
    diff.added = b
        .keys()
        .filter(|k| !a.contains_key(*k))
        .map(|k| k.to_string())
        .collect();

    diff
}
