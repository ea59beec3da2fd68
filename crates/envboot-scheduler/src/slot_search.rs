//! Forward time scan and cross-zone fallback.
//!
//! Capacity over time is not monotonic: a slot that fails at one step may
//! pass at the next and fail again after that. Every step is evaluated
//! independently against the snapshot.

use chrono::{DateTime, Duration, Utc};
use envboot_core::time::offset;
use envboot_core::{
    AllocationSnapshot, Decision, EngineConfig, EngineError, EngineResult, NoneOutcome,
};
use tracing::{debug, info, warn};

use crate::availability::min_free_over;

/// Earliest start in `zone` at which `required` nodes stay free for `duration`.
///
/// Candidates are `start, start + step, start + 2·step, …` up to and
/// including `start + lookahead`. `Ok(None)` means the lookahead was
/// exhausted, which is an expected outcome rather than a fault.
pub fn find_slot(
    snapshot: &AllocationSnapshot,
    zone: &str,
    start: DateTime<Utc>,
    duration: Duration,
    required: u32,
    step: Duration,
    lookahead: Duration,
) -> EngineResult<Option<DateTime<Utc>>> {
    if duration <= Duration::zero() {
        return Err(EngineError::InvalidDuration(
            duration.num_seconds() as f64 / 3600.0,
        ));
    }
    if step <= Duration::zero() {
        return Err(EngineError::InvalidConfig(format!(
            "search step must be positive, got {}s",
            step.num_seconds()
        )));
    }
    if lookahead < Duration::zero() {
        return Err(EngineError::InvalidConfig(format!(
            "lookahead must not be negative, got {}s",
            lookahead.num_seconds()
        )));
    }

    let total = snapshot.zone(zone)?.total_nodes;
    if required > total {
        debug!(zone, required, total, "requirement exceeds zone size");
        return Ok(None);
    }

    let deadline = start.checked_add_signed(lookahead).ok_or_else(|| {
        EngineError::InvalidConfig(format!(
            "lookahead of {}h runs past the supported calendar range",
            lookahead.num_hours()
        ))
    })?;
    let mut t = start;
    while t <= deadline {
        let free = min_free_over(snapshot, zone, t, offset(t, duration)?)?;
        if free >= i64::from(required) {
            debug!(zone, %t, free, required, "slot found");
            return Ok(Some(t));
        }
        debug!(zone, %t, free, required, "slot too small");
        match t.checked_add_signed(step) {
            Some(next) => t = next,
            None => break,
        }
    }
    Ok(None)
}

/// Shape of one search: when, for how long, how many nodes, and how far to look.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotQuery {
    pub start: DateTime<Utc>,
    pub duration: Duration,
    pub required: u32,
    pub step: Duration,
    pub lookahead: Duration,
    /// Lookahead for each alternate zone.
    pub alt_lookahead: Duration,
}

impl SlotQuery {
    /// Build a query using the scheduling section of `config`.
    pub fn from_config(
        config: &EngineConfig,
        start: DateTime<Utc>,
        duration: Duration,
        required: u32,
    ) -> Self {
        let scheduling = &config.scheduling;
        Self {
            start,
            duration,
            required,
            step: Duration::minutes(i64::from(scheduling.step_minutes)),
            lookahead: Duration::hours(i64::from(scheduling.lookahead_hours)),
            alt_lookahead: Duration::hours(i64::from(scheduling.alt_zone_lookahead_hours)),
        }
    }
}

/// Search the preferred zone over time, then each alternate zone in order.
///
/// The returned decision names the mechanism that succeeded:
/// `none(requested_window_available)` for the preferred zone at the
/// requested start, `time_shift` for a later start there, `zone_change` for
/// an alternate zone. When every zone fails the decision carries
/// `insufficient_capacity` with the zones that were checked.
pub fn find_zone_or_time(
    snapshot: &AllocationSnapshot,
    preferred_zone: &str,
    alt_zones: &[String],
    query: &SlotQuery,
) -> EngineResult<Decision> {
    let mut checked_zones = vec![preferred_zone.to_string()];

    if let Some(found) = find_slot(
        snapshot,
        preferred_zone,
        query.start,
        query.duration,
        query.required,
        query.step,
        query.lookahead,
    )? {
        if found == query.start {
            info!(zone = preferred_zone, start = %found, "requested window available");
            return Ok(Decision::None(NoneOutcome::RequestedWindowAvailable));
        }
        let shift_minutes = (found - query.start).num_minutes();
        info!(zone = preferred_zone, start = %found, shift_minutes, "shifted start time");
        return Ok(Decision::TimeShift {
            zone: preferred_zone.to_string(),
            requested_start: query.start,
            start: found,
            shift_minutes,
        });
    }

    for zone in alt_zones.iter().filter(|z| z.as_str() != preferred_zone) {
        checked_zones.push(zone.clone());
        if let Some(found) = find_slot(
            snapshot,
            zone,
            query.start,
            query.duration,
            query.required,
            query.step,
            query.alt_lookahead,
        )? {
            info!(from = preferred_zone, to = %zone, start = %found, "changed zone");
            return Ok(Decision::ZoneChange {
                from_zone: preferred_zone.to_string(),
                to_zone: zone.clone(),
                start: found,
            });
        }
    }

    warn!(
        required = query.required,
        zones = ?checked_zones,
        "no capacity in any zone"
    );
    Ok(Decision::None(NoneOutcome::InsufficientCapacity {
        required: query.required,
        checked_zones,
    }))
}
