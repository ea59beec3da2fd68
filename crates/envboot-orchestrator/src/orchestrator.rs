//! Case flows: score, build a request, decide, reserve, cost.
//!
//! Each flow is a short deterministic pipeline over one immutable snapshot.
//! Decisions are appended in the order they are made and the result is
//! assembled once at the end.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use envboot_analyzer::{FsRepoSource, Thresholds, apply_tier_override, score_repository};
use envboot_core::cost::{round_su, su_per_hour, su_total};
use envboot_core::time::{hours, offset};
use envboot_core::{
    AllocationSnapshot, CaseKind, ComplexityTier, Decision, EngineConfig, EngineError,
    EngineResult, NoneOutcome, ReservationDescriptor, ResourceRequest, ScoreReport, SloCheck,
};
use envboot_downgrade::{DowngradeEngine, NegotiationInput, SmokeTestExecutor};
use envboot_scheduler::{SlotQuery, find_zone_or_time, min_free_over};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::flavor::select_flavor;
use crate::lease::{LeaseBackend, LeaseRequest};

/// Caller-supplied parameters for one case run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseInputs {
    pub repo_path: PathBuf,
    pub tier_override: Option<String>,
    pub duration_override_hours: Option<f64>,
    pub node_count: u32,
    /// Requested start; the snapshot's as-of time when absent.
    pub start: Option<DateTime<Utc>>,
    /// SLO deadline. Reported only, never used to bound the search.
    pub start_by: Option<DateTime<Utc>>,
    pub smoke_command: Option<String>,
    /// Overrides the configured preferred zone.
    pub zone: Option<String>,
    pub lease_name: Option<String>,
    pub dry_run: bool,
}

impl Default for CaseInputs {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            tier_override: None,
            duration_override_hours: None,
            node_count: 1,
            start: None,
            start_by: None,
            smoke_command: None,
            zone: None,
            lease_name: None,
            dry_run: false,
        }
    }
}

impl CaseInputs {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            ..Self::default()
        }
    }
}

/// Everything one case run decided and reserved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseResult {
    pub case: CaseKind,
    pub inputs: CaseInputs,
    pub decisions: Vec<Decision>,
    pub reservation: ReservationDescriptor,
    /// SU per hour across all reserved nodes.
    pub su_estimate_per_hour: f64,
    pub su_estimate_total: f64,
    pub slo: SloCheck,
    pub complexity_tier: ComplexityTier,
    pub score: ScoreReport,
    /// The profile actually reserved.
    pub profile: ResourceRequest,
}

/// Scored repository and the request derived from it.
struct Prepared {
    score: ScoreReport,
    request: ResourceRequest,
    zone: String,
    start: DateTime<Utc>,
}

impl Prepared {
    /// The scored request at the requested zone and start.
    fn as_requested(&self) -> Placement {
        Placement {
            zone: self.zone.clone(),
            start: self.start,
            profile: self.request.clone(),
        }
    }
}

/// Where, when, and with what profile to reserve.
struct Placement {
    zone: String,
    start: DateTime<Utc>,
    profile: ResourceRequest,
}

pub struct CaseOrchestrator<'a> {
    config: &'a EngineConfig,
    snapshot: &'a AllocationSnapshot,
    backend: &'a mut dyn LeaseBackend,
    smoke: Option<&'a dyn SmokeTestExecutor>,
    thresholds: Thresholds,
}

impl<'a> CaseOrchestrator<'a> {
    pub fn new(
        config: &'a EngineConfig,
        snapshot: &'a AllocationSnapshot,
        backend: &'a mut dyn LeaseBackend,
    ) -> Self {
        Self {
            config,
            snapshot,
            backend,
            smoke: None,
            thresholds: Thresholds::default(),
        }
    }

    pub fn with_smoke_test(mut self, smoke: &'a dyn SmokeTestExecutor) -> Self {
        self.smoke = Some(smoke);
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn run(&mut self, case: CaseKind, inputs: &CaseInputs) -> EngineResult<CaseResult> {
        info!(case = %case, repo = %inputs.repo_path.display(), dry_run = inputs.dry_run, "running case");
        match case {
            CaseKind::Base => self.run_base(inputs),
            CaseKind::Limited => self.run_limited(inputs),
            CaseKind::Downgrade => self.run_downgrade(inputs),
            CaseKind::Complexity => self.run_complexity(inputs),
        }
    }

    /// Reserve the scored request at the preferred zone and requested start.
    pub fn run_base(&mut self, inputs: &CaseInputs) -> EngineResult<CaseResult> {
        let prepared = self.prepare(inputs)?;
        let placement = prepared.as_requested();
        self.reserve(CaseKind::Base, inputs, prepared, placement, Vec::new())
    }

    /// Check the requested window first and search time, then zones, if it
    /// is short.
    pub fn run_limited(&mut self, inputs: &CaseInputs) -> EngineResult<CaseResult> {
        let prepared = self.prepare(inputs)?;
        let request = prepared.request.clone();
        let duration = hours(request.duration_hours)?;
        let required = inputs.node_count;

        let free = min_free_over(
            self.snapshot,
            &prepared.zone,
            prepared.start,
            offset(prepared.start, duration)?,
        )?;
        debug!(zone = %prepared.zone, free, required, "requested window checked");

        let decision = if free >= i64::from(required) {
            Decision::None(NoneOutcome::RequestedWindowAvailable)
        } else {
            let query = SlotQuery::from_config(self.config, prepared.start, duration, required);
            find_zone_or_time(
                self.snapshot,
                &prepared.zone,
                &self.config.scheduling.alt_zones,
                &query,
            )?
        };

        let (zone, start) = match &decision {
            Decision::TimeShift { zone, start, .. } => (zone.clone(), *start),
            Decision::ZoneChange { to_zone, start, .. } => (to_zone.clone(), *start),
            Decision::None(NoneOutcome::InsufficientCapacity {
                required,
                checked_zones,
            }) => {
                return Err(EngineError::InsufficientCapacity {
                    required: *required,
                    checked_zones: checked_zones.clone(),
                });
            }
            _ => (prepared.zone.clone(), prepared.start),
        };

        let placement = Placement {
            zone,
            start,
            profile: request,
        };
        self.reserve(CaseKind::Limited, inputs, prepared, placement, vec![decision])
    }

    /// Negotiate a smaller profile and reserve whichever profile survives.
    pub fn run_downgrade(&mut self, inputs: &CaseInputs) -> EngineResult<CaseResult> {
        let prepared = self.prepare(inputs)?;

        let config = self.config;
        let mut engine = DowngradeEngine::new(&config.downgrade, &config.host);
        if let Some(smoke) = self.smoke {
            engine = engine.with_smoke_test(smoke);
        }
        let negotiation = engine.negotiate(&NegotiationInput {
            original: &prepared.request,
            tier: prepared.score.tier,
            gpu_framework_detected: prepared.score.gpu_framework_detected,
            smoke_command: inputs.smoke_command.as_deref(),
        })?;

        if !negotiation.accepted {
            warn!(reason = ?negotiation.reason, "reserving original request");
        }
        let placement = Placement {
            profile: negotiation.effective().clone(),
            ..prepared.as_requested()
        };
        let decisions = vec![negotiation.to_decision(inputs.node_count)];
        self.reserve(CaseKind::Downgrade, inputs, prepared, placement, decisions)
    }

    /// Reserve the tier's default profile and record the mapping.
    pub fn run_complexity(&mut self, inputs: &CaseInputs) -> EngineResult<CaseResult> {
        let prepared = self.prepare(inputs)?;
        let decision = Decision::None(NoneOutcome::ComplexityMapping {
            tier: prepared.score.tier,
            score: prepared.score.score,
            overridden: prepared.score.tier_overridden,
        });
        let placement = prepared.as_requested();
        self.reserve(CaseKind::Complexity, inputs, prepared, placement, vec![decision])
    }

    fn prepare(&self, inputs: &CaseInputs) -> EngineResult<Prepared> {
        if inputs.node_count == 0 {
            return Err(EngineError::InvalidRequest(
                "node_count must be at least 1".to_string(),
            ));
        }

        let source = FsRepoSource::open(&inputs.repo_path)?;
        let score = score_repository(&source, &self.thresholds)?;
        let score = apply_tier_override(score, inputs.tier_override.as_deref())?;

        let mut request = score.tier.default_request();
        if let Some(duration) = inputs.duration_override_hours {
            request = request.with_duration(duration);
        }
        request.validate()?;

        let zone = inputs
            .zone
            .clone()
            .unwrap_or_else(|| self.config.scheduling.preferred_zone.clone());
        self.snapshot.zone(&zone)?;

        Ok(Prepared {
            score,
            request,
            zone,
            start: inputs.start.unwrap_or_else(|| self.snapshot.as_of()),
        })
    }

    fn reserve(
        &mut self,
        case: CaseKind,
        inputs: &CaseInputs,
        prepared: Prepared,
        placement: Placement,
        decisions: Vec<Decision>,
    ) -> EngineResult<CaseResult> {
        let Placement {
            zone,
            start,
            profile,
        } = placement;
        let end = offset(start, hours(profile.duration_hours)?)?;
        let flavor = select_flavor(&profile).to_string();
        let count = inputs.node_count;

        let lease_id = if inputs.dry_run {
            debug!(zone = %zone, "dry run, lease backend not called");
            None
        } else {
            let request = LeaseRequest {
                name: inputs
                    .lease_name
                    .clone()
                    .unwrap_or_else(|| format!("envboot-{case}")),
                zone: zone.clone(),
                start,
                end,
                flavor: flavor.clone(),
                count,
                profile: profile.clone(),
            };
            Some(self.backend.create(&request)?.lease_id)
        };

        let nodes = f64::from(count);
        let su_estimate_per_hour = round_su(su_per_hour(&profile, &self.config.host) * nodes);
        let su_estimate_total = round_su(su_total(&profile, &self.config.host) * nodes);
        let slo = SloCheck::evaluate(inputs.start_by, start);
        if !slo.met {
            warn!(start = %start, start_by = ?inputs.start_by, "reservation starts after deadline");
        }

        info!(
            case = %case,
            zone = %zone,
            start = %start,
            flavor = %flavor,
            count,
            lease_id = ?lease_id,
            su_total = su_estimate_total,
            "case complete"
        );

        Ok(CaseResult {
            case,
            inputs: inputs.clone(),
            decisions,
            reservation: ReservationDescriptor {
                zone,
                start,
                end,
                flavor_or_profile: flavor,
                count,
                lease_id,
            },
            su_estimate_per_hour,
            su_estimate_total,
            slo,
            complexity_tier: prepared.score.tier,
            score: prepared.score,
            profile,
        })
    }
}
