//! envboot.toml configuration parser.
//!
//! The configuration is built once per invocation, validated, and then
//! passed by reference to every component that needs it.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::{DowngradePolicy, HostCapability};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub downgrade: DowngradePolicy,
    pub scheduling: SchedulingConfig,
    pub host: HostCapability,
    pub smoke_test: SmokeTestConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// How far past the requested start the search may look.
    pub lookahead_hours: u32,
    pub step_minutes: u32,
    pub preferred_zone: String,
    /// Fallback zones, tried in listed order.
    pub alt_zones: Vec<String>,
    /// Lookahead for each alternate zone; 0 means only the original start.
    pub alt_zone_lookahead_hours: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            lookahead_hours: 72,
            step_minutes: 30,
            preferred_zone: "current".to_string(),
            alt_zones: Vec::new(),
            alt_zone_lookahead_hours: 0,
        }
    }
}

/// Upper bound on any search lookahead (one year).
pub const MAX_LOOKAHEAD_HOURS: u32 = 24 * 366;

impl SchedulingConfig {
    pub fn validate(&self) -> EngineResult<()> {
        for (field, value) in [
            ("lookahead_hours", self.lookahead_hours),
            ("alt_zone_lookahead_hours", self.alt_zone_lookahead_hours),
        ] {
            if value > MAX_LOOKAHEAD_HOURS {
                return Err(EngineError::InvalidConfig(format!(
                    "scheduling.{field} must be <= {MAX_LOOKAHEAD_HOURS}, got {value}"
                )));
            }
        }
        if self.step_minutes == 0 {
            return Err(EngineError::InvalidConfig(
                "scheduling.step_minutes must be > 0".to_string(),
            ));
        }
        if self.preferred_zone.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "scheduling.preferred_zone must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for zone in &self.alt_zones {
            if zone.trim().is_empty() {
                return Err(EngineError::InvalidConfig(
                    "scheduling.alt_zones contains an empty zone name".to_string(),
                ));
            }
            if !seen.insert(zone.as_str()) {
                return Err(EngineError::InvalidConfig(format!(
                    "scheduling.alt_zones lists {zone} more than once"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeTestConfig {
    pub timeout_secs: u64,
}

impl Default for SmokeTestConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.downgrade.validate()?;
        self.scheduling.validate()?;
        if self.host.host_vcpus == 0 || self.host.host_gpus == 0 {
            return Err(EngineError::InvalidConfig(
                "host.host_vcpus and host.host_gpus must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Preferred zone followed by the alternates, without repeats.
    pub fn zone_order(&self) -> Vec<String> {
        let mut zones = vec![self.scheduling.preferred_zone.clone()];
        for zone in &self.scheduling.alt_zones {
            if !zones.contains(zone) {
                zones.push(zone.clone());
            }
        }
        zones
    }
}
