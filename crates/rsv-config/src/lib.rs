//! rsv-config
//!
//! Layered YAML configuration for a resolver run.
//!
//! - Later documents deep-merge over earlier ones (base -> environment -> run).
//! - The merged document is canonicalized (sorted keys, compact JSON) and
//!   hashed with SHA-256 so every run records exactly which config it used.
//! - [`ResolverConfig::from_loaded`] is the typed view; the tier table is
//!   validated there, once, before any record is touched.

mod tiers;

pub use tiers::{TierSpec, TierTable, TierTableError};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

pub const DEFAULT_REBASING_THRESHOLD: f64 = 0.5;

/// JSON-pointer prefixes actually read by [`ResolverConfig::from_loaded`].
/// Keep in sync with the typed sections below.
const CONSUMED_POINTERS: &[&str] = &[
    "/tiers",
    "/levels/rebasing_threshold",
    "/overrides/strict",
    "/runtime/workers",
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; anything else (arrays included) is replaced
/// wholesale by the later layer.
fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(&sort_keys(v)).context("canonical json serialize failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Typed view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    tiers: Option<TierSpec>,
    #[serde(default)]
    levels: RawLevels,
    #[serde(default)]
    overrides: RawOverrides,
    #[serde(default)]
    runtime: RawRuntime,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawLevels {
    rebasing_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawOverrides {
    strict: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawRuntime {
    workers: Option<usize>,
}

/// Everything a run needs from configuration, validated.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub tiers: TierTable,
    /// Fraction of the prior level; a decrease larger than this is rebasing.
    pub rebasing_threshold: f64,
    /// Untraceable overrides abort the run instead of being flagged.
    pub strict_overrides: bool,
    pub workers: usize,
    pub config_hash: String,
}

impl ResolverConfig {
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        let raw: RawConfig = serde_json::from_value(loaded.config_json.clone())
            .context("config does not match resolver schema")?;

        let Some(spec) = raw.tiers else {
            bail!("CONFIG_MISSING_TIERS: /tiers must list at least one tier label");
        };
        let tiers = TierTable::from_spec(&spec).context("invalid /tiers")?;

        let rebasing_threshold = raw
            .levels
            .rebasing_threshold
            .unwrap_or(DEFAULT_REBASING_THRESHOLD);
        if !(0.0..=1.0).contains(&rebasing_threshold) {
            bail!(
                "CONFIG_BAD_THRESHOLD: /levels/rebasing_threshold must be within [0, 1], got {}",
                rebasing_threshold
            );
        }

        let workers = match raw.runtime.workers {
            Some(0) => bail!("CONFIG_BAD_WORKERS: /runtime/workers must be >= 1"),
            Some(n) => n,
            None => default_workers(),
        };

        Ok(Self {
            tiers,
            rebasing_threshold,
            strict_overrides: raw.overrides.strict.unwrap_or(false),
            workers,
            config_hash: loaded.config_hash.clone(),
        })
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Flags config leaves no resolver code reads (typos like `level:` instead of
/// `levels:` otherwise silently fall back to defaults).
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = CONSUMED_POINTERS.iter().map(|p| p.to_string()).collect();
    let consumed_prefixes: Vec<String> = consumed.into_iter().collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|lp| !consumed_prefixes.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected. First few: {:?}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.iter().take(12).collect::<Vec<_>>()
        );
    }

    Ok(report)
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but not "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if leaf == prefix {
        return true;
    }
    leaf.starts_with(prefix)
        && leaf
            .get(prefix.len()..prefix.len() + 1)
            .map(|c| c == "/")
            .unwrap_or(false)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, k.replace('~', "~0").replace('/', "~1"));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                collect_leaf_pointers(vv, &format!("{prefix}/{i}"), out);
            }
        }
        _ => {
            let p = if prefix.is_empty() { "/".to_string() } else { prefix.to_string() };
            out.push(p);
        }
    }
}
