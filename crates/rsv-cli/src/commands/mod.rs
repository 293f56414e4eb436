//! Command handlers for the `rsv` binary.

pub mod audit;
pub mod resolve;

use anyhow::{Context, Result};
use rsv_config::LoadedConfig;
use uuid::Uuid;

pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    rsv_config::load_layered_yaml(&refs)
}

pub fn parse_run_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("invalid run id '{raw}'"))
}
