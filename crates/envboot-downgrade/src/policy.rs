//! Bounded downgrade negotiation.
//!
//! # Algorithm
//!
//! ```text
//! vcpus'    = max(1, floor(vcpus * (1 - max_vcpu_reduction)))
//! ram'      = max(0, ram_gb * (1 - max_ram_reduction))
//! gpus'     = 0 if allow_gpu_downgrade else gpus   (never increased)
//! duration' = compensation(duration, vcpus, vcpus', max_duration_increase)
//! ```
//!
//! GPUs of a heavy or very heavy repository that imports a GPU framework
//! are kept whenever `allow_gpu_downgrade` is false. The candidate is then
//! checked against the policy bounds and, if the policy asks for it, a
//! smoke test. Any rejection leaves the original request in force.

use envboot_core::cost::{round_su, su_total};
use envboot_core::{
    ComplexityTier, Decision, DowngradePolicy, EngineError, EngineResult, HostCapability,
    ResourceRequest,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::smoke::SmokeTestExecutor;

const EPSILON: f64 = 1e-9;

/// Maps `(duration_hours, vcpus, vcpus_after, max_duration_increase)` to the
/// compensated duration in hours.
pub type DurationCompensation = fn(f64, u32, u32, f64) -> f64;

/// Lengthen the run in proportion to the lost vCPUs, capped by policy.
pub fn capped_linear(duration_hours: f64, vcpus: u32, vcpus_after: u32, max_increase: f64) -> f64 {
    let linear = duration_hours * f64::from(vcpus) / f64::from(vcpus_after.max(1));
    linear.min(duration_hours * max_increase)
}

/// Whether GPUs must be kept for this repository under `policy`.
pub fn gpus_protected(
    tier: ComplexityTier,
    gpu_framework_detected: bool,
    policy: &DowngradePolicy,
) -> bool {
    tier.is_heavy() && gpu_framework_detected && !policy.allow_gpu_downgrade
}

/// What the caller knows about the request being negotiated.
#[derive(Debug, Clone)]
pub struct NegotiationInput<'a> {
    pub original: &'a ResourceRequest,
    pub tier: ComplexityTier,
    pub gpu_framework_detected: bool,
    pub smoke_command: Option<&'a str>,
}

/// Outcome of one negotiation.
///
/// When `accepted` is false, `downgraded` equals `original` and `reason`
/// says why the candidate was discarded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Negotiation {
    pub accepted: bool,
    pub original: ResourceRequest,
    pub downgraded: ResourceRequest,
    /// Total SU saved per node, `su_total(original) - su_total(downgraded)`.
    pub savings_su: f64,
    pub reason: Option<String>,
}

impl Negotiation {
    /// The profile the caller should reserve.
    pub fn effective(&self) -> &ResourceRequest {
        &self.downgraded
    }

    /// Decision for a reservation of `nodes` nodes; savings cover all of them.
    pub fn to_decision(&self, nodes: u32) -> Decision {
        Decision::Downgrade {
            accepted: self.accepted,
            original: self.original.clone(),
            downgraded: self.downgraded.clone(),
            savings_su: round_su(self.savings_su * f64::from(nodes)),
            reason: self.reason.clone(),
        }
    }
}

pub struct DowngradeEngine<'a> {
    policy: &'a DowngradePolicy,
    host: &'a HostCapability,
    compensation: DurationCompensation,
    smoke: Option<&'a dyn SmokeTestExecutor>,
}

impl<'a> DowngradeEngine<'a> {
    pub fn new(policy: &'a DowngradePolicy, host: &'a HostCapability) -> Self {
        Self {
            policy,
            host,
            compensation: capped_linear,
            smoke: None,
        }
    }

    pub fn with_compensation(mut self, compensation: DurationCompensation) -> Self {
        self.compensation = compensation;
        self
    }

    pub fn with_smoke_test(mut self, smoke: &'a dyn SmokeTestExecutor) -> Self {
        self.smoke = Some(smoke);
        self
    }

    /// Apply the policy formulas to `original` without any gating.
    pub fn build_candidate(
        &self,
        original: &ResourceRequest,
        tier: ComplexityTier,
        gpu_framework_detected: bool,
    ) -> ResourceRequest {
        let policy = self.policy;

        let vcpus_scaled = (f64::from(original.vcpus) * (1.0 - policy.max_vcpu_reduction)).floor();
        let vcpus = (vcpus_scaled as u32).clamp(1, original.vcpus.max(1));

        let ram_gb = (original.ram_gb * (1.0 - policy.max_ram_reduction)).max(0.0);

        let gpus = if gpus_protected(tier, gpu_framework_detected, policy) {
            original.gpus
        } else if policy.allow_gpu_downgrade {
            0
        } else {
            original.gpus
        };

        let bare_metal = original.bare_metal && !policy.allow_bare_metal_to_kvm;

        let duration_hours = (self.compensation)(
            original.duration_hours,
            original.vcpus,
            vcpus,
            policy.max_duration_increase,
        );

        ResourceRequest {
            vcpus,
            ram_gb,
            gpus,
            bare_metal,
            duration_hours,
        }
    }

    /// Negotiate a downgrade, returning `DowngradeRejected` when the
    /// candidate breaks the policy or fails its smoke test.
    pub fn try_downgrade(&self, input: &NegotiationInput<'_>) -> EngineResult<Negotiation> {
        self.policy.validate()?;
        input.original.validate()?;

        let candidate = self.build_candidate(input.original, input.tier, input.gpu_framework_detected);
        let protected = gpus_protected(input.tier, input.gpu_framework_detected, self.policy);
        debug!(
            changed = ?input.original.changed_fields(&candidate),
            gpus_protected = protected,
            "built downgrade candidate"
        );

        validate_downgrade(input.original, &candidate, self.policy, protected)?;

        if self.policy.require_smoke_test {
            let (Some(smoke), Some(command)) = (self.smoke, input.smoke_command) else {
                return Err(EngineError::DowngradeRejected(
                    "smoke test required but no executor or command supplied".to_string(),
                ));
            };
            if !smoke.run(command) {
                return Err(EngineError::DowngradeRejected(format!(
                    "smoke test failed: {command}"
                )));
            }
        }

        let savings_su = su_total(input.original, self.host) - su_total(&candidate, self.host);
        info!(
            vcpus = candidate.vcpus,
            ram_gb = candidate.ram_gb,
            gpus = candidate.gpus,
            duration_hours = candidate.duration_hours,
            savings_su = round_su(savings_su),
            "downgrade accepted"
        );

        Ok(Negotiation {
            accepted: true,
            original: input.original.clone(),
            downgraded: candidate,
            savings_su,
            reason: None,
        })
    }

    /// Like [`try_downgrade`](Self::try_downgrade), but a rejection becomes
    /// an unaccepted negotiation that keeps the original request.
    pub fn negotiate(&self, input: &NegotiationInput<'_>) -> EngineResult<Negotiation> {
        match self.try_downgrade(input) {
            Err(EngineError::DowngradeRejected(reason)) => {
                warn!(%reason, "downgrade rejected, keeping original request");
                Ok(Negotiation {
                    accepted: false,
                    original: input.original.clone(),
                    downgraded: input.original.clone(),
                    savings_su: 0.0,
                    reason: Some(reason),
                })
            }
            other => other,
        }
    }
}

/// Check a candidate against the policy bounds relative to `original`.
pub fn validate_downgrade(
    original: &ResourceRequest,
    candidate: &ResourceRequest,
    policy: &DowngradePolicy,
    gpus_protected: bool,
) -> EngineResult<()> {
    let reject = |msg: String| Err(EngineError::DowngradeRejected(msg));

    let vcpu_floor = (f64::from(original.vcpus) * (1.0 - policy.max_vcpu_reduction))
        .floor()
        .max(1.0);
    if candidate.vcpus < 1 || f64::from(candidate.vcpus) < vcpu_floor {
        return reject(format!(
            "vcpus {} below policy floor {vcpu_floor}",
            candidate.vcpus
        ));
    }
    if candidate.vcpus > original.vcpus {
        return reject(format!("vcpus increased to {}", candidate.vcpus));
    }

    let ram_floor = (original.ram_gb * (1.0 - policy.max_ram_reduction)).max(0.0);
    if candidate.ram_gb + EPSILON < ram_floor || candidate.ram_gb > original.ram_gb + EPSILON {
        return reject(format!(
            "ram_gb {} outside [{ram_floor}, {}]",
            candidate.ram_gb, original.ram_gb
        ));
    }

    if candidate.gpus > original.gpus {
        return reject(format!("gpus increased to {}", candidate.gpus));
    }
    if candidate.gpus != original.gpus && (gpus_protected || !policy.allow_gpu_downgrade) {
        return reject(format!(
            "gpus may not change ({} -> {})",
            original.gpus, candidate.gpus
        ));
    }

    if candidate.bare_metal != original.bare_metal
        && !(original.bare_metal && policy.allow_bare_metal_to_kvm)
    {
        return reject("platform change not allowed".to_string());
    }

    let max_duration = original.duration_hours * policy.max_duration_increase;
    if candidate.duration_hours <= 0.0 || candidate.duration_hours > max_duration + EPSILON {
        return reject(format!(
            "duration {} h outside (0, {max_duration}]",
            candidate.duration_hours
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smoke::StaticSmokeTest;
    use proptest::prelude::*;

    fn no_smoke_policy() -> DowngradePolicy {
        DowngradePolicy {
            require_smoke_test: false,
            ..DowngradePolicy::default()
        }
    }

    fn input(original: &ResourceRequest, tier: ComplexityTier, gpu: bool) -> NegotiationInput<'_> {
        NegotiationInput {
            original,
            tier,
            gpu_framework_detected: gpu,
            smoke_command: None,
        }
    }

    #[test]
    fn heavy_defaults_downgrade() {
        let policy = no_smoke_policy();
        let host = HostCapability::default();
        let engine = DowngradeEngine::new(&policy, &host);
        let original = ComplexityTier::Heavy.default_request();

        let result = engine
            .negotiate(&input(&original, ComplexityTier::Heavy, false))
            .unwrap();
        assert!(result.accepted);
        assert_eq!(result.downgraded.vcpus, 4);
        assert_eq!(result.downgraded.ram_gb, 24.0);
        assert_eq!(result.downgraded.gpus, 0);
        assert_eq!(result.downgraded.duration_hours, 8.0);

        // 0.6667 SU/h * 4 h vs 0.0833 SU/h * 8 h
        let expected = su_total(&original, &host) - su_total(&result.downgraded, &host);
        assert!((result.savings_su - expected).abs() < 1e-12);
        assert_eq!(round_su(result.savings_su), 2.0);
    }

    #[test]
    fn gpus_protected_for_heavy_gpu_repo() {
        let policy = DowngradePolicy {
            allow_gpu_downgrade: false,
            max_vcpu_reduction: 1.0,
            max_ram_reduction: 1.0,
            ..no_smoke_policy()
        };
        let host = HostCapability::default();
        let engine = DowngradeEngine::new(&policy, &host);
        let original = ComplexityTier::VeryHeavy.default_request();

        let result = engine
            .negotiate(&input(&original, ComplexityTier::VeryHeavy, true))
            .unwrap();
        assert!(result.accepted);
        assert_eq!(result.downgraded.gpus, 2);
        assert_eq!(result.downgraded.vcpus, 1);
        assert_eq!(result.downgraded.ram_gb, 0.0);
    }

    #[test]
    fn duration_is_capped_by_policy() {
        let policy = DowngradePolicy {
            max_vcpu_reduction: 0.75,
            max_duration_increase: 1.5,
            ..no_smoke_policy()
        };
        let host = HostCapability::default();
        let engine = DowngradeEngine::new(&policy, &host);
        let original = ComplexityTier::VeryHeavy.default_request();

        let candidate = engine.build_candidate(&original, ComplexityTier::VeryHeavy, false);
        assert_eq!(candidate.vcpus, 4);
        assert_eq!(candidate.duration_hours, 12.0);
    }

    #[test]
    fn single_vcpu_never_drops_to_zero() {
        let policy = DowngradePolicy {
            max_vcpu_reduction: 1.0,
            ..no_smoke_policy()
        };
        let host = HostCapability::default();
        let engine = DowngradeEngine::new(&policy, &host);
        let original = ResourceRequest {
            vcpus: 1,
            ram_gb: 2.0,
            gpus: 0,
            bare_metal: false,
            duration_hours: 1.0,
        };
        let candidate = engine.build_candidate(&original, ComplexityTier::Simple, false);
        assert_eq!(candidate.vcpus, 1);
        assert_eq!(candidate.duration_hours, 1.0);
    }

    #[test]
    fn compensation_is_swappable() {
        fn fixed(duration: f64, _: u32, _: u32, _: f64) -> f64 {
            duration
        }
        let policy = no_smoke_policy();
        let host = HostCapability::default();
        let engine = DowngradeEngine::new(&policy, &host).with_compensation(fixed);
        let original = ComplexityTier::Moderate.default_request();
        let candidate = engine.build_candidate(&original, ComplexityTier::Moderate, false);
        assert_eq!(candidate.duration_hours, original.duration_hours);
    }

    #[test]
    fn failing_smoke_test_keeps_original() {
        let policy = DowngradePolicy::default();
        let host = HostCapability::default();
        let smoke = StaticSmokeTest::failing();
        let engine = DowngradeEngine::new(&policy, &host).with_smoke_test(&smoke);
        let original = ComplexityTier::Heavy.default_request();
        let mut req = input(&original, ComplexityTier::Heavy, false);
        req.smoke_command = Some("python -c 'import torch'");

        assert!(matches!(
            engine.try_downgrade(&req),
            Err(EngineError::DowngradeRejected(_))
        ));

        let result = engine.negotiate(&req).unwrap();
        assert!(!result.accepted);
        assert_eq!(result.downgraded, original);
        assert_eq!(result.savings_su, 0.0);
        assert!(result.reason.unwrap().contains("smoke test failed"));
        assert_eq!(smoke.calls(), 2);
    }

    #[test]
    fn passing_smoke_test_accepts() {
        let policy = DowngradePolicy::default();
        let host = HostCapability::default();
        let smoke = StaticSmokeTest::passing();
        let engine = DowngradeEngine::new(&policy, &host).with_smoke_test(&smoke);
        let original = ComplexityTier::Moderate.default_request();
        let mut req = input(&original, ComplexityTier::Moderate, false);
        req.smoke_command = Some("make check");

        assert!(engine.negotiate(&req).unwrap().accepted);
        assert_eq!(smoke.calls(), 1);
    }

    #[test]
    fn required_smoke_test_without_command_fails_closed() {
        let policy = DowngradePolicy::default();
        let host = HostCapability::default();
        let smoke = StaticSmokeTest::passing();
        let engine = DowngradeEngine::new(&policy, &host).with_smoke_test(&smoke);
        let original = ComplexityTier::Moderate.default_request();

        let result = engine
            .negotiate(&input(&original, ComplexityTier::Moderate, false))
            .unwrap();
        assert!(!result.accepted);
        assert_eq!(smoke.calls(), 0);
    }

    #[test]
    fn bare_metal_moves_to_kvm_only_when_allowed() {
        let host = HostCapability::default();
        let original = ComplexityTier::VeryHeavy.default_request();

        let policy = no_smoke_policy();
        let candidate = DowngradeEngine::new(&policy, &host).build_candidate(
            &original,
            ComplexityTier::VeryHeavy,
            false,
        );
        assert!(candidate.bare_metal);

        let policy = DowngradePolicy {
            allow_bare_metal_to_kvm: true,
            ..no_smoke_policy()
        };
        let candidate = DowngradeEngine::new(&policy, &host).build_candidate(
            &original,
            ComplexityTier::VeryHeavy,
            false,
        );
        assert!(!candidate.bare_metal);
    }

    #[test]
    fn validate_rejects_gpu_increase_and_long_duration() {
        let policy = DowngradePolicy::default();
        let original = ComplexityTier::Heavy.default_request();

        let mut more_gpus = original.clone();
        more_gpus.gpus = 2;
        assert!(validate_downgrade(&original, &more_gpus, &policy, false).is_err());

        let mut too_long = original.clone();
        too_long.duration_hours = 100.0;
        assert!(validate_downgrade(&original, &too_long, &policy, false).is_err());

        let mut dropped = original.clone();
        dropped.gpus = 0;
        assert!(validate_downgrade(&original, &dropped, &policy, true).is_err());
    }

    #[test]
    fn invalid_policy_is_config_error() {
        let policy = DowngradePolicy {
            max_vcpu_reduction: 2.0,
            ..no_smoke_policy()
        };
        let host = HostCapability::default();
        let original = ComplexityTier::Simple.default_request();
        assert!(matches!(
            DowngradeEngine::new(&policy, &host).negotiate(&input(&original, ComplexityTier::Simple, false)),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn decision_rounds_savings() {
        let policy = no_smoke_policy();
        let host = HostCapability::default();
        let original = ComplexityTier::Moderate.default_request();
        let result = DowngradeEngine::new(&policy, &host)
            .negotiate(&input(&original, ComplexityTier::Moderate, false))
            .unwrap();
        match result.to_decision(1) {
            Decision::Downgrade { accepted, savings_su, .. } => {
                assert!(accepted);
                assert_eq!(savings_su, round_su(result.savings_su));
            }
            other => panic!("unexpected decision {other:?}"),
        }
        match result.to_decision(3) {
            Decision::Downgrade { savings_su, .. } => {
                assert_eq!(savings_su, round_su(result.savings_su * 3.0));
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn candidate_respects_hard_bounds(
            vcpus in 1u32..128,
            ram_gb in 0.0f64..1024.0,
            gpus in 0u32..8,
            bare_metal in any::<bool>(),
            duration_hours in 0.25f64..48.0,
            vcpu_cut in 0.0f64..=1.0,
            ram_cut in 0.0f64..=1.0,
            allow_gpu_downgrade in any::<bool>(),
            max_increase in 1.0f64..4.0,
            tier_idx in 0usize..4,
            gpu_detected in any::<bool>(),
        ) {
            let policy = DowngradePolicy {
                max_vcpu_reduction: vcpu_cut,
                max_ram_reduction: ram_cut,
                allow_gpu_downgrade,
                max_duration_increase: max_increase,
                require_smoke_test: false,
                allow_bare_metal_to_kvm: false,
            };
            let host = HostCapability::default();
            let tier = ComplexityTier::ALL[tier_idx];
            let original = ResourceRequest { vcpus, ram_gb, gpus, bare_metal, duration_hours };

            let candidate = DowngradeEngine::new(&policy, &host)
                .build_candidate(&original, tier, gpu_detected);

            prop_assert!(candidate.vcpus >= 1);
            prop_assert!(candidate.vcpus <= vcpus);
            prop_assert!(candidate.gpus <= gpus);
            if gpus_protected(tier, gpu_detected, &policy) {
                prop_assert_eq!(candidate.gpus, gpus);
            }
            prop_assert!(candidate.duration_hours >= duration_hours - 1e-9);
            prop_assert!(candidate.duration_hours <= duration_hours * max_increase + 1e-9);
            prop_assert!(
                validate_downgrade(&original, &candidate, &policy,
                    gpus_protected(tier, gpu_detected, &policy)).is_ok()
            );
        }
    }
}
