use anyhow::{bail, Result};
use rsv_audit::{diff_runs, read_run, verify_hash_chain, VerifyResult};

use super::parse_run_id;

pub fn verify(path: &str) -> Result<()> {
    match verify_hash_chain(path)? {
        VerifyResult::Valid { lines } => {
            println!("chain_ok=true lines={}", lines);
            Ok(())
        }
        VerifyResult::Broken { line, reason } => {
            println!("chain_ok=false line={} reason={}", line, reason);
            bail!("diagnostics hash chain broken at line {line}")
        }
    }
}

pub fn diff(path: &str, before: &str, after: &str, after_path: Option<&str>) -> Result<()> {
    let before_events = read_run(path, parse_run_id(before)?)?;
    let after_events = read_run(after_path.unwrap_or(path), parse_run_id(after)?)?;
    if before_events.is_empty() {
        bail!("run {before} not found in {path}");
    }
    if after_events.is_empty() {
        bail!("run {after} not found");
    }

    let diff = diff_runs(&before_events, &after_events);
    println!(
        "added={} removed={} changed={} unchanged={}",
        diff.added.len(),
        diff.removed.len(),
        diff.changed.len(),
        diff.unchanged
    );
    println!("{}", serde_json::to_string_pretty(&diff)?);
    Ok(())
}
