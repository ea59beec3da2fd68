//! Flavor selection for a resource profile.

use envboot_core::ResourceRequest;

/// Smallest flavor that fits the profile.
pub fn select_flavor(profile: &ResourceRequest) -> &'static str {
    match (profile.bare_metal, profile.gpus > 0) {
        (true, true) => "g1.h100.pci.1",
        (true, false) => "baremetal",
        (false, true) => "g1.kvm.1",
        (false, false) => match profile.vcpus {
            16.. => "g1.kvm.16",
            8.. => "g1.kvm.8",
            4.. => "g1.kvm.4",
            _ => "g1.kvm.2",
        },
    }
}
