//! envboot-orchestrator - composes scoring, search, and negotiation into
//! the four case flows.
//!
//! # Architecture
//!
//! ```text
//! CaseOrchestrator
//!   ├── envboot-analyzer    (repo → ScoreReport → tier → ResourceRequest)
//!   ├── envboot-scheduler   (min_free_over, find_zone_or_time)
//!   ├── envboot-downgrade   (DowngradeEngine + SmokeTestExecutor)
//!   ├── LeaseBackend        (create / query / delete)
//!   └── CostModel           (SU per hour and total)
//! ```
//!
//! The lease backend is a trait. [`SimulatedBackend`] is seeded from the
//! allocation snapshot and rejects over-subscription the way a real
//! reservation service would.

pub mod audit;
pub mod flavor;
pub mod lease;
pub mod orchestrator;

pub use audit::{AuditLog, AuditRecord};
pub use flavor::select_flavor;
pub use lease::{
    BackendError, BackendResult, LeaseBackend, LeaseReceipt, LeaseRequest, LeaseStatus,
    SimulatedBackend,
};
pub use orchestrator::{CaseInputs, CaseOrchestrator, CaseResult};
