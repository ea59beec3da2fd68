pub mod analyze;
pub mod config;
pub mod plan;
pub mod zones;

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use envboot_core::{AllocationSnapshot, EngineConfig};

/// clap value parser for timestamps.
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    envboot_core::time::parse_timestamp(raw).map_err(|e| e.to_string())
}

pub fn load_snapshot(path: &Path) -> anyhow::Result<AllocationSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    Ok(AllocationSnapshot::from_json(&content)?)
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::from_file(path)?),
        None => Ok(EngineConfig::default()),
    }
}
