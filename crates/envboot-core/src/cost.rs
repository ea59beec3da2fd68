//! Service-Unit charging model.
//!
//! Bare metal is billed per node-hour (1.0 SU, or 2.0 SU for GPU nodes).
//! KVM profiles are billed as their share of the reference host:
//!
//! ```text
//! su_per_hour = 1.0 * vcpus / host_vcpus + 2.0 * gpus / host_gpus
//! ```

use crate::types::{HostCapability, ResourceRequest};

const BARE_METAL_CPU_RATE: f64 = 1.0;
const BARE_METAL_GPU_RATE: f64 = 2.0;
const KVM_CPU_RATE: f64 = 1.0;
const KVM_GPU_RATE: f64 = 2.0;

/// SU charged per hour for one node with this profile.
pub fn su_per_hour(profile: &ResourceRequest, host: &HostCapability) -> f64 {
    if profile.bare_metal {
        return if profile.gpus > 0 {
            BARE_METAL_GPU_RATE
        } else {
            BARE_METAL_CPU_RATE
        };
    }

    let cpu = KVM_CPU_RATE * (f64::from(profile.vcpus) / f64::from(host.host_vcpus.max(1)));
    let gpu = if profile.gpus > 0 {
        KVM_GPU_RATE * (f64::from(profile.gpus) / f64::from(host.host_gpus.max(1)))
    } else {
        0.0
    };
    cpu + gpu
}

/// SU charged for the profile's whole duration.
pub fn su_total(profile: &ResourceRequest, host: &HostCapability) -> f64 {
    su_per_hour(profile, host) * profile.duration_hours
}

/// Round an SU value to 4 decimal places for reporting.
pub fn round_su(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(vcpus: u32, gpus: u32, bare_metal: bool, duration_hours: f64) -> ResourceRequest {
        ResourceRequest {
            vcpus,
            ram_gb: 32.0,
            gpus,
            bare_metal,
            duration_hours,
        }
    }

    #[test]
    fn bare_metal_rates_are_flat() {
        let host = HostCapability::default();
        assert_eq!(su_per_hour(&profile(16, 2, true, 8.0), &host), 2.0);
        assert_eq!(su_per_hour(&profile(16, 0, true, 8.0), &host), 1.0);
    }

    #[test]
    fn kvm_worked_example() {
        let host = HostCapability {
            host_vcpus: 48,
            host_gpus: 4,
            host_ram_gb: 192,
        };
        let per_hour = su_per_hour(&profile(8, 1, false, 4.0), &host);
        assert_eq!(round_su(per_hour), 0.6667);
        assert_eq!(round_su(8.0 / 48.0), 0.1667);
    }

    #[test]
    fn kvm_without_gpu_is_cpu_share_only() {
        let host = HostCapability::default();
        let per_hour = su_per_hour(&profile(24, 0, false, 1.0), &host);
        assert!((per_hour - 0.5).abs() < 1e-12);
    }

    #[test]
    fn total_scales_with_duration() {
        let host = HostCapability::default();
        assert_eq!(su_total(&profile(16, 2, true, 8.0), &host), 16.0);
        let kvm = profile(8, 1, false, 3.0);
        assert!((su_total(&kvm, &host) - su_per_hour(&kvm, &host) * 3.0).abs() < 1e-12);
    }

    #[test]
    fn rounding_keeps_four_places() {
        assert_eq!(round_su(1.0 / 3.0), 0.3333);
        assert_eq!(round_su(2.0), 2.0);
    }
}
