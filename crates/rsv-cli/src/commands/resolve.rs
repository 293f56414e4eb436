//! `rsv resolve`: load inputs, run, publish outputs.
//!
//! Outputs are written only after the run completes. An aborted run leaves
//! the output directory and the level snapshot as they were.

use anyhow::{Context, Result};
use rsv_audit::DiagnosticsWriter;
use rsv_config::{report_unused_keys, ResolverConfig, UnusedKeyPolicy};
use rsv_levels::{FileLevelStore, InMemoryLevelStore, LevelHistoryStore, LevelPolicy};
use rsv_overrides::{load_overrides_csv, OverrideRegistry};
use std::fs;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use super::{load_config, parse_run_id};
use crate::facts::load_facts_csv;

pub struct ResolveArgs {
    pub facts_path: String,
    pub config_paths: Vec<String>,
    pub overrides_path: Option<String>,
    pub levels_path: Option<String>,
    pub out_dir: String,
    pub run_id: Option<String>,
    pub unused_keys: UnusedKeyPolicy,
}

pub fn resolve(args: ResolveArgs) -> Result<()> {
    let loaded = load_config(&args.config_paths)?;
    let report = report_unused_keys(&loaded.config_json, args.unused_keys)?;
    for pointer in &report.unused_leaf_pointers {
        tracing::warn!(pointer = %pointer, "config key is not used");
    }
    let config = ResolverConfig::from_loaded(&loaded)?;

    let run_id = match args.run_id.as_deref() {
        Some(raw) => parse_run_id(raw)?,
        None => Uuid::new_v4(),
    };

    let facts = load_facts_csv(&args.facts_path)?;
    let overrides = match args.overrides_path.as_deref() {
        Some(path) => {
            let entries = load_overrides_csv(path)?;
            OverrideRegistry::from_entries(entries, config.strict_overrides)?
        }
        None => OverrideRegistry::empty(),
    };

    let policy = LevelPolicy {
        rebasing_threshold: config.rebasing_threshold,
    };
    let file_store = match args.levels_path.as_deref() {
        Some(path) => Some(FileLevelStore::open(path, policy)?),
        None => None,
    };
    let scratch = InMemoryLevelStore::new(policy);
    let store: &dyn LevelHistoryStore = match &file_store {
        Some(s) => s,
        None => &scratch,
    };

    info!(run_id = %run_id, facts = facts.len(), "resolve");
    let output = rsv_runtime::run(facts, &config, &overrides, store)
        .context("resolution run aborted")?;

    let out_dir = Path::new(&args.out_dir);
    fs::create_dir_all(out_dir)
        .with_context(|| format!("create output dir failed: {}", out_dir.display()))?;

    // resolved.json first (temp file + rename), then the diagnostics append,
    // then the level snapshot. A failure at any step leaves the later ones
    // untouched, so levels never advance past published output.
    let resolved_path = out_dir.join("resolved.json");
    let json = serde_json::to_string_pretty(&output.report(run_id))
        .context("serialize resolved facts failed")?;
    let tmp = out_dir.join("resolved.json.tmp");
    fs::write(&tmp, json + "\n").with_context(|| format!("write failed: {}", tmp.display()))?;
    fs::rename(&tmp, &resolved_path)
        .with_context(|| format!("rename {} -> {} failed", tmp.display(), resolved_path.display()))?;

    let mut writer = DiagnosticsWriter::open(out_dir.join("diagnostics.jsonl"))?;
    let rows = rsv_runtime::emit_diagnostics(&output, run_id, &mut writer)?;

    if let Some(store) = &file_store {
        store.save()?;
    }

    println!("run_id={}", run_id);
    println!("config_hash={}", config.config_hash);
    println!(
        "resolved={} unresolved={} stale_overrides={} diagnostics_rows={}",
        output.resolved.len(),
        output.unresolved.len(),
        output.stale_overrides(),
        rows
    );
    println!(
        "levels converted={} baselines={} stale_replays={} rebasings={}",
        output.conversion.converted,
        output.conversion.baselines,
        output.conversion.stale_replays,
        output.conversion.rebasings
    );
    Ok(())
}
