//! envboot-core - data model, errors, configuration, and SU costs.
//!
//! Every other envboot crate depends on this one. It holds no I/O beyond
//! reading a configuration file.

pub mod config;
pub mod cost;
pub mod error;
pub mod time;
pub mod types;

pub use config::{EngineConfig, SchedulingConfig, SmokeTestConfig};
pub use error::{EngineError, EngineResult};
pub use types::*;
