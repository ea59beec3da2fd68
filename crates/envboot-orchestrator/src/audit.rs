//! Append-only JSON-lines record of created leases.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use envboot_core::{CaseKind, EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::orchestrator::CaseResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(with = "envboot_core::time::lenient")]
    pub timestamp: DateTime<Utc>,
    pub case: CaseKind,
    pub zone: String,
    pub lease_id: String,
    #[serde(with = "envboot_core::time::lenient")]
    pub start: DateTime<Utc>,
    #[serde(with = "envboot_core::time::lenient")]
    pub end: DateTime<Utc>,
    pub flavor: String,
    pub count: u32,
}

impl AuditRecord {
    /// Record for a case that created a lease; `None` for dry runs.
    pub fn from_result(result: &CaseResult, timestamp: DateTime<Utc>) -> Option<Self> {
        let reservation = &result.reservation;
        Some(Self {
            timestamp,
            case: result.case,
            zone: reservation.zone.clone(),
            lease_id: reservation.lease_id.clone()?,
            start: reservation.start,
            end: reservation.end,
            flavor: reservation.flavor_or_profile.clone(),
            count: reservation.count,
        })
    }
}

pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line, creating the file if needed.
    pub fn append(&self, record: &AuditRecord) -> EngineResult<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        debug!(path = %self.path.display(), lease_id = %record.lease_id, "audit record appended");
        Ok(())
    }

    /// Every record in the log, oldest first.
    pub fn read_all(&self) -> EngineResult<Vec<AuditRecord>> {
        let content = std::fs::read_to_string(&self.path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| EngineError::Io(std::io::Error::other(e)))
            })
            .collect()
    }
}
