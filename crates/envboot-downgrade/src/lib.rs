//! envboot-downgrade - bounded resource negotiation.
//!
//! When capacity is short, [`DowngradeEngine`] shrinks a request within the
//! limits of a [`envboot_core::DowngradePolicy`] and stretches its duration
//! to compensate. A candidate is only accepted after it passes the policy
//! bounds and, when required, a smoke test run through a
//! [`SmokeTestExecutor`].
//!
//! ```text
//! original ──► build_candidate ──► validate_downgrade ──► smoke test ──► accepted
//!                                        │                    │
//!                                        └──── rejected ◄─────┘ (original kept)
//! ```

pub mod policy;
pub mod smoke;

pub use policy::{
    DowngradeEngine, DurationCompensation, Negotiation, NegotiationInput, capped_linear,
    gpus_protected, validate_downgrade,
};
pub use smoke::{ShellSmokeTest, SmokeTestExecutor, StaticSmokeTest};
