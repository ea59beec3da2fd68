//! Shared types used across envboot crates.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

// ── Resource profile ───────────────────────────────────────────────

/// A resource profile to reserve, plus how long it is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub vcpus: u32,
    pub ram_gb: f64,
    pub gpus: u32,
    pub bare_metal: bool,
    pub duration_hours: f64,
}

impl ResourceRequest {
    /// Check the profile bounds: at least one vCPU, non-negative RAM, and a
    /// positive duration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.vcpus < 1 {
            return Err(EngineError::InvalidRequest(
                "vcpus must be at least 1".to_string(),
            ));
        }
        if !self.ram_gb.is_finite() || self.ram_gb < 0.0 {
            return Err(EngineError::InvalidRequest(format!(
                "ram_gb must be >= 0, got {}",
                self.ram_gb
            )));
        }
        if !self.duration_hours.is_finite() || self.duration_hours <= 0.0 {
            return Err(EngineError::InvalidDuration(self.duration_hours));
        }
        Ok(())
    }

    /// Same profile, different duration.
    pub fn with_duration(&self, duration_hours: f64) -> Self {
        Self {
            duration_hours,
            ..self.clone()
        }
    }

    /// Names of the fields that differ between `self` and `other`.
    pub fn changed_fields(&self, other: &ResourceRequest) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.vcpus != other.vcpus {
            changed.push("vcpus");
        }
        if self.ram_gb != other.ram_gb {
            changed.push("ram_gb");
        }
        if self.gpus != other.gpus {
            changed.push("gpus");
        }
        if self.bare_metal != other.bare_metal {
            changed.push("bare_metal");
        }
        if self.duration_hours != other.duration_hours {
            changed.push("duration_hours");
        }
        changed
    }
}

// ── Complexity tier ────────────────────────────────────────────────

/// Bucket describing a repository's inferred resource needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Simple,
    Moderate,
    Heavy,
    VeryHeavy,
}

impl ComplexityTier {
    pub const ALL: [ComplexityTier; 4] = [
        ComplexityTier::Simple,
        ComplexityTier::Moderate,
        ComplexityTier::Heavy,
        ComplexityTier::VeryHeavy,
    ];

    /// Map a complexity score onto a tier: 0–1 simple, 2–3 moderate,
    /// 4–5 heavy, 6+ very heavy.
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=1 => ComplexityTier::Simple,
            2..=3 => ComplexityTier::Moderate,
            4..=5 => ComplexityTier::Heavy,
            _ => ComplexityTier::VeryHeavy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityTier::Simple => "simple",
            ComplexityTier::Moderate => "moderate",
            ComplexityTier::Heavy => "heavy",
            ComplexityTier::VeryHeavy => "very_heavy",
        }
    }

    /// Heavy and very heavy tiers are eligible for GPU protection.
    pub fn is_heavy(&self) -> bool {
        matches!(self, ComplexityTier::Heavy | ComplexityTier::VeryHeavy)
    }

    /// Default resource profile and duration for this tier.
    pub fn default_request(&self) -> ResourceRequest {
        let (vcpus, ram_gb, gpus, bare_metal, duration_hours) = match self {
            ComplexityTier::Simple => (2, 4.0, 0, false, 1.0),
            ComplexityTier::Moderate => (8, 16.0, 0, false, 2.0),
            ComplexityTier::Heavy => (8, 32.0, 1, false, 4.0),
            ComplexityTier::VeryHeavy => (16, 64.0, 2, true, 8.0),
        };
        ResourceRequest {
            vcpus,
            ram_gb,
            gpus,
            bare_metal,
            duration_hours,
        }
    }
}

impl fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplexityTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "simple" => Ok(ComplexityTier::Simple),
            "moderate" => Ok(ComplexityTier::Moderate),
            "heavy" => Ok(ComplexityTier::Heavy),
            "very_heavy" => Ok(ComplexityTier::VeryHeavy),
            _ => Err(EngineError::InvalidComplexityOverride(s.to_string())),
        }
    }
}

// ── Policy and host ────────────────────────────────────────────────

/// Bounds on how far a request may be shrunk when capacity is short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DowngradePolicy {
    /// Fraction of vCPUs that may be removed, in `[0, 1]`.
    pub max_vcpu_reduction: f64,
    /// Fraction of RAM that may be removed, in `[0, 1]`.
    pub max_ram_reduction: f64,
    pub allow_gpu_downgrade: bool,
    /// Upper bound on the duration multiplier, `>= 1`.
    pub max_duration_increase: f64,
    pub require_smoke_test: bool,
    pub allow_bare_metal_to_kvm: bool,
}

impl Default for DowngradePolicy {
    fn default() -> Self {
        Self {
            max_vcpu_reduction: 0.5,
            max_ram_reduction: 0.25,
            allow_gpu_downgrade: true,
            max_duration_increase: 2.0,
            require_smoke_test: true,
            allow_bare_metal_to_kvm: false,
        }
    }
}

impl DowngradePolicy {
    pub fn validate(&self) -> EngineResult<()> {
        for (name, value) in [
            ("max_vcpu_reduction", self.max_vcpu_reduction),
            ("max_ram_reduction", self.max_ram_reduction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidConfig(format!(
                    "downgrade.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if !self.max_duration_increase.is_finite() || self.max_duration_increase < 1.0 {
            return Err(EngineError::InvalidConfig(format!(
                "downgrade.max_duration_increase must be >= 1, got {}",
                self.max_duration_increase
            )));
        }
        Ok(())
    }
}

/// Reference physical host used to prorate KVM shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostCapability {
    pub host_vcpus: u32,
    pub host_gpus: u32,
    pub host_ram_gb: u32,
}

impl Default for HostCapability {
    fn default() -> Self {
        Self {
            host_vcpus: 48,
            host_gpus: 4,
            host_ram_gb: 192,
        }
    }
}

// ── Allocation snapshot ────────────────────────────────────────────

/// A half-open `[start, end)` hold on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct ReservationWindow {
    pub node_id: String,
    #[serde(with = "crate::time::lenient")]
    pub start: DateTime<Utc>,
    #[serde(with = "crate::time::lenient")]
    pub end: DateTime<Utc>,
}

impl ReservationWindow {
    pub fn new(
        node_id: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let node_id = node_id.into();
        if start >= end {
            return Err(EngineError::InvalidSnapshot(format!(
                "window for node {node_id} has start >= end ({start} >= {end})"
            )));
        }
        Ok(Self { node_id, start, end })
    }

    /// Whether the window holds its node at instant `t`.
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

#[derive(Deserialize)]
struct RawWindow {
    node_id: String,
    #[serde(with = "crate::time::lenient")]
    start: DateTime<Utc>,
    #[serde(with = "crate::time::lenient")]
    end: DateTime<Utc>,
}

impl TryFrom<RawWindow> for ReservationWindow {
    type Error = EngineError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        ReservationWindow::new(raw.node_id, raw.start, raw.end)
    }
}

/// Node pool and reservation calendar for one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneAllocation {
    pub total_nodes: u32,
    #[serde(default)]
    pub windows: Vec<ReservationWindow>,
}

/// Point-in-time view of every zone's reservations.
///
/// Captured once per scheduling decision and never mutated afterwards;
/// there are no mutating accessors once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    #[serde(with = "crate::time::lenient")]
    as_of: DateTime<Utc>,
    zones: BTreeMap<String, ZoneAllocation>,
}

impl AllocationSnapshot {
    pub fn new(as_of: DateTime<Utc>, zones: BTreeMap<String, ZoneAllocation>) -> Self {
        Self { as_of, zones }
    }

    /// Builder-style helper used when assembling fixtures.
    pub fn with_zone(
        mut self,
        zone: impl Into<String>,
        total_nodes: u32,
        windows: Vec<ReservationWindow>,
    ) -> Self {
        self.zones.insert(
            zone.into(),
            ZoneAllocation {
                total_nodes,
                windows,
            },
        );
        self
    }

    /// Parse and validate a snapshot from JSON.
    pub fn from_json(input: &str) -> EngineResult<Self> {
        serde_json::from_str(input).map_err(|e| EngineError::InvalidSnapshot(e.to_string()))
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn zone(&self, zone: &str) -> EngineResult<&ZoneAllocation> {
        self.zones
            .get(zone)
            .ok_or_else(|| EngineError::UnknownZone(zone.to_string()))
    }

    pub fn zone_names(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    pub fn zones(&self) -> &BTreeMap<String, ZoneAllocation> {
        &self.zones
    }
}

// ── Repository scoring ─────────────────────────────────────────────

/// Complexity signals a repository scan can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    GpuFramework,
    GpuKernelSources,
    GpuBaseImage,
    BuildSystem,
    LargeCodebase,
    LargeFiles,
    TestFootprint,
}

impl Signal {
    /// Points the signal contributes to the complexity score.
    pub fn points(&self) -> u32 {
        match self {
            Signal::GpuFramework => 3,
            Signal::GpuKernelSources | Signal::GpuBaseImage => 2,
            Signal::BuildSystem
            | Signal::LargeCodebase
            | Signal::LargeFiles
            | Signal::TestFootprint => 1,
        }
    }
}

/// A signal that fired, with a short human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalHit {
    pub signal: Signal,
    pub points: u32,
    pub detail: String,
}

impl SignalHit {
    pub fn new(signal: Signal, detail: impl Into<String>) -> Self {
        Self {
            signal,
            points: signal.points(),
            detail: detail.into(),
        }
    }
}

/// Result of scoring one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub root: String,
    pub score: u32,
    pub tier: ComplexityTier,
    /// Set when the tier came from a caller override instead of the score.
    pub tier_overridden: bool,
    pub signals: Vec<SignalHit>,
    pub gpu_framework_detected: bool,
    pub total_files: u64,
    pub total_lines: u64,
    /// SHA-256 over the sorted `(path, size, lines)` listing.
    pub fingerprint: String,
}

impl ScoreReport {
    pub fn has_signal(&self, signal: Signal) -> bool {
        self.signals.iter().any(|hit| hit.signal == signal)
    }
}

// ── Decisions and results ──────────────────────────────────────────

/// Why no scheduling action was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NoneOutcome {
    /// The requested zone and time already had enough capacity.
    RequestedWindowAvailable,
    /// Every zone was searched without success.
    InsufficientCapacity {
        required: u32,
        checked_zones: Vec<String>,
    },
    /// Informational: the tier chosen for the repository.
    ComplexityMapping {
        tier: ComplexityTier,
        score: u32,
        overridden: bool,
    },
}

/// One scheduling action, recorded in the order it was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// Same zone, later start.
    TimeShift {
        zone: String,
        #[serde(with = "crate::time::lenient")]
        requested_start: DateTime<Utc>,
        #[serde(with = "crate::time::lenient")]
        start: DateTime<Utc>,
        shift_minutes: i64,
    },
    /// Different zone.
    ZoneChange {
        from_zone: String,
        to_zone: String,
        #[serde(with = "crate::time::lenient")]
        start: DateTime<Utc>,
    },
    /// Downgrade negotiation, accepted or not.
    Downgrade {
        accepted: bool,
        original: ResourceRequest,
        downgraded: ResourceRequest,
        /// SU saved across every reserved node, same unit as `su_estimate_total`.
        savings_su: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    None(NoneOutcome),
}

impl Decision {
    pub fn kind(&self) -> &'static str {
        match self {
            Decision::TimeShift { .. } => "time_shift",
            Decision::ZoneChange { .. } => "zone_change",
            Decision::Downgrade { .. } => "downgrade",
            Decision::None(_) => "none",
        }
    }
}

/// The four decision flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    Base,
    Limited,
    Downgrade,
    Complexity,
}

impl CaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseKind::Base => "base",
            CaseKind::Limited => "limited",
            CaseKind::Downgrade => "downgrade",
            CaseKind::Complexity => "complexity",
        }
    }
}

impl fmt::Display for CaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(CaseKind::Base),
            "limited" => Ok(CaseKind::Limited),
            "downgrade" => Ok(CaseKind::Downgrade),
            "complexity" => Ok(CaseKind::Complexity),
            other => Err(EngineError::InvalidRequest(format!("unknown case: {other}"))),
        }
    }
}

/// The reservation a case settled on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationDescriptor {
    pub zone: String,
    #[serde(with = "crate::time::lenient")]
    pub start: DateTime<Utc>,
    #[serde(with = "crate::time::lenient")]
    pub end: DateTime<Utc>,
    pub flavor_or_profile: String,
    pub count: u32,
    /// `None` for dry runs.
    pub lease_id: Option<String>,
}

/// Start-by deadline and whether the reservation meets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloCheck {
    pub start_by: Option<DateTime<Utc>>,
    pub met: bool,
}

impl SloCheck {
    pub fn evaluate(start_by: Option<DateTime<Utc>>, start: DateTime<Utc>) -> Self {
        Self {
            start_by,
            met: start_by.is_none_or(|deadline| start <= deadline),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tier_boundaries() {
        assert_eq!(ComplexityTier::from_score(0), ComplexityTier::Simple);
        assert_eq!(ComplexityTier::from_score(1), ComplexityTier::Simple);
        assert_eq!(ComplexityTier::from_score(2), ComplexityTier::Moderate);
        assert_eq!(ComplexityTier::from_score(3), ComplexityTier::Moderate);
        assert_eq!(ComplexityTier::from_score(5), ComplexityTier::Heavy);
        assert_eq!(ComplexityTier::from_score(6), ComplexityTier::VeryHeavy);
        assert_eq!(ComplexityTier::from_score(11), ComplexityTier::VeryHeavy);
    }

    #[test]
    fn tier_defaults_match_table() {
        let very_heavy = ComplexityTier::VeryHeavy.default_request();
        assert_eq!(very_heavy.vcpus, 16);
        assert_eq!(very_heavy.gpus, 2);
        assert!(very_heavy.bare_metal);
        assert_eq!(very_heavy.duration_hours, 8.0);

        for tier in ComplexityTier::ALL {
            assert!(tier.default_request().validate().is_ok(), "{tier}");
        }
    }

    #[test]
    fn tier_override_parsing() {
        assert_eq!("very_heavy".parse::<ComplexityTier>().unwrap(), ComplexityTier::VeryHeavy);
        assert_eq!("Heavy".parse::<ComplexityTier>().unwrap(), ComplexityTier::Heavy);
        assert!(matches!(
            "gigantic".parse::<ComplexityTier>(),
            Err(EngineError::InvalidComplexityOverride(_))
        ));
    }

    #[test]
    fn request_validation() {
        let mut req = ComplexityTier::Simple.default_request();
        req.duration_hours = 0.0;
        assert!(matches!(req.validate(), Err(EngineError::InvalidDuration(_))));

        let mut req = ComplexityTier::Simple.default_request();
        req.vcpus = 0;
        assert!(matches!(req.validate(), Err(EngineError::InvalidRequest(_))));
    }

    #[test]
    fn window_rejects_empty_interval() {
        let t = Utc.with_ymd_and_hms(2025, 9, 2, 0, 0, 0).unwrap();
        assert!(ReservationWindow::new("n1", t, t).is_err());
        let w = ReservationWindow::new("n1", t, t + chrono::Duration::hours(1)).unwrap();
        assert!(w.covers(t));
        assert!(!w.covers(w.end));
    }

    #[test]
    fn snapshot_parses_and_validates_windows() {
        let json = r#"{
            "as_of": "2025-09-02T00:00:00Z",
            "zones": {
                "uc": {
                    "total_nodes": 3,
                    "windows": [
                        {"node_id": "n1", "start": "2025-09-02 01:00", "end": "2025-09-02T02:00:00Z"}
                    ]
                },
                "tacc": {"total_nodes": 1}
            }
        }"#;
        let snapshot = AllocationSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.zone("uc").unwrap().windows.len(), 1);
        assert!(snapshot.zone("tacc").unwrap().windows.is_empty());
        assert!(matches!(snapshot.zone("nu"), Err(EngineError::UnknownZone(_))));

        let bad = json.replace("2025-09-02 01:00", "2025-09-02 03:00");
        assert!(matches!(
            AllocationSnapshot::from_json(&bad),
            Err(EngineError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn decision_serializes_with_kind_tag() {
        let decision = Decision::None(NoneOutcome::InsufficientCapacity {
            required: 4,
            checked_zones: vec!["uc".to_string()],
        });
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["kind"], "none");
        assert_eq!(value["outcome"], "insufficient_capacity");
        assert_eq!(decision.kind(), "none");
    }

    #[test]
    fn slo_without_deadline_is_met() {
        let t = Utc.with_ymd_and_hms(2025, 9, 2, 0, 0, 0).unwrap();
        assert!(SloCheck::evaluate(None, t).met);
        assert!(SloCheck::evaluate(Some(t), t).met);
        assert!(!SloCheck::evaluate(Some(t), t + chrono::Duration::minutes(1)).met);
    }

    #[test]
    fn changed_fields_lists_differences() {
        let original = ComplexityTier::Heavy.default_request();
        let mut smaller = original.clone();
        smaller.vcpus = 4;
        smaller.duration_hours = 8.0;
        assert_eq!(original.changed_fields(&smaller), vec!["vcpus", "duration_hours"]);
    }
}
