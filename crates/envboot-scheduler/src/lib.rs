//! envboot capacity search.
//!
//! # Components
//!
//! - **`availability`**: free node counts at an instant or over an interval
//! - **`slot_search`**: forward time scan and cross-zone fallback
//!
//! Both are pure functions of an [`envboot_core::AllocationSnapshot`]; the
//! snapshot is never mutated.

pub mod availability;
pub mod slot_search;

pub use availability::{ZoneSummary, free_at, min_free_over, zone_summary};
pub use slot_search::{SlotQuery, find_slot, find_zone_or_time};
