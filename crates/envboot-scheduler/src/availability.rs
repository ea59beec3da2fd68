//! Free-capacity calculator over time-windowed reservations.
//!
//! Occupancy is piecewise constant and only changes at window boundaries,
//! so interval minima are computed by sweeping those boundaries instead of
//! sampling the interval.

use chrono::{DateTime, Utc};
use envboot_core::{AllocationSnapshot, EngineError, EngineResult, ZoneAllocation};
use serde::Serialize;
use tracing::debug;

/// Free nodes in `zone` at instant `t`.
///
/// A window `[start, end)` holds its node at `t` when `start <= t < end`.
/// The result may be negative if the snapshot itself is over-subscribed.
pub fn free_at(snapshot: &AllocationSnapshot, zone: &str, t: DateTime<Utc>) -> EngineResult<i64> {
    Ok(free_in(snapshot.zone(zone)?, t))
}

/// Minimum free nodes in `zone` across the half-open interval `[start, end)`.
pub fn min_free_over(
    snapshot: &AllocationSnapshot,
    zone: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> EngineResult<i64> {
    if start >= end {
        let hours = (end - start).num_seconds() as f64 / 3600.0;
        return Err(EngineError::InvalidDuration(hours));
    }
    let allocation = snapshot.zone(zone)?;

    // Boundaries strictly inside (start, end) with the occupancy change at each.
    let mut events: Vec<(DateTime<Utc>, i64)> = Vec::new();
    for window in &allocation.windows {
        if window.start > start && window.start < end {
            events.push((window.start, 1));
        }
        if window.end > start && window.end < end {
            events.push((window.end, -1));
        }
    }
    events.sort_by_key(|(at, _)| *at);

    let total = i64::from(allocation.total_nodes);
    let mut busy = busy_in(allocation, start);
    let mut min_free = total - busy;

    let mut i = 0;
    while i < events.len() {
        let at = events[i].0;
        while i < events.len() && events[i].0 == at {
            busy += events[i].1;
            i += 1;
        }
        min_free = min_free.min(total - busy);
    }

    debug!(zone, %start, %end, boundaries = events.len(), min_free, "swept interval");
    Ok(min_free)
}

/// One zone's headline numbers at an instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSummary {
    pub zone: String,
    pub total_nodes: u32,
    pub free_nodes: i64,
    pub windows: usize,
}

/// Every zone in the snapshot with its total and free counts at `at`.
pub fn zone_summary(snapshot: &AllocationSnapshot, at: DateTime<Utc>) -> Vec<ZoneSummary> {
    snapshot
        .zones()
        .iter()
        .map(|(zone, allocation)| ZoneSummary {
            zone: zone.clone(),
            total_nodes: allocation.total_nodes,
            free_nodes: free_in(allocation, at),
            windows: allocation.windows.len(),
        })
        .collect()
}

fn busy_in(allocation: &ZoneAllocation, t: DateTime<Utc>) -> i64 {
    allocation.windows.iter().filter(|w| w.covers(t)).count() as i64
}

fn free_in(allocation: &ZoneAllocation, t: DateTime<Utc>) -> i64 {
    i64::from(allocation.total_nodes) - busy_in(allocation, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use envboot_core::ReservationWindow;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 2, 0, 0, 0).unwrap()
    }

    fn window(node: &str, from_min: i64, to_min: i64) -> ReservationWindow {
        ReservationWindow::new(
            node,
            t0() + Duration::minutes(from_min),
            t0() + Duration::minutes(to_min),
        )
        .unwrap()
    }

    fn snapshot(total: u32, windows: Vec<ReservationWindow>) -> AllocationSnapshot {
        AllocationSnapshot::new(t0(), Default::default()).with_zone("uc", total, windows)
    }

    #[test]
    fn empty_zone_is_fully_free() {
        let snap = snapshot(10, vec![]);
        assert_eq!(free_at(&snap, "uc", t0()).unwrap(), 10);
        assert_eq!(
            min_free_over(&snap, "uc", t0(), t0() + Duration::hours(5)).unwrap(),
            10
        );
    }

    #[test]
    fn windows_are_half_open() {
        let snap = snapshot(4, vec![window("n1", 60, 120)]);
        assert_eq!(free_at(&snap, "uc", t0() + Duration::minutes(59)).unwrap(), 4);
        assert_eq!(free_at(&snap, "uc", t0() + Duration::minutes(60)).unwrap(), 3);
        assert_eq!(free_at(&snap, "uc", t0() + Duration::minutes(120)).unwrap(), 4);
    }

    #[test]
    fn interval_ending_at_window_start_is_unaffected() {
        let snap = snapshot(4, vec![window("n1", 60, 120)]);
        let free = min_free_over(&snap, "uc", t0(), t0() + Duration::minutes(60)).unwrap();
        assert_eq!(free, 4);
    }

    #[test]
    fn minimum_catches_short_window_inside_interval() {
        let snap = snapshot(
            5,
            vec![
                window("n1", 10, 20),
                window("n2", 15, 18),
                window("n3", 30, 40),
            ],
        );
        let free = min_free_over(&snap, "uc", t0(), t0() + Duration::hours(1)).unwrap();
        assert_eq!(free, 3);
    }

    #[test]
    fn back_to_back_windows_do_not_double_count() {
        let snap = snapshot(3, vec![window("n1", 0, 30), window("n1", 30, 60)]);
        let free = min_free_over(&snap, "uc", t0(), t0() + Duration::hours(1)).unwrap();
        assert_eq!(free, 2);
    }

    #[test]
    fn unknown_zone_fails() {
        let snap = snapshot(3, vec![]);
        assert!(matches!(
            free_at(&snap, "tacc", t0()),
            Err(EngineError::UnknownZone(z)) if z == "tacc"
        ));
    }

    #[test]
    fn empty_interval_is_invalid_duration() {
        let snap = snapshot(3, vec![]);
        assert!(matches!(
            min_free_over(&snap, "uc", t0(), t0()),
            Err(EngineError::InvalidDuration(_))
        ));
    }

    #[test]
    fn summary_lists_every_zone() {
        let snap = snapshot(3, vec![window("n1", 0, 30)]).with_zone("tacc", 8, vec![]);
        let summary = zone_summary(&snap, t0());
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].zone, "tacc");
        assert_eq!(summary[0].free_nodes, 8);
        assert_eq!(summary[1].zone, "uc");
        assert_eq!(summary[1].free_nodes, 2);
    }

    #[test]
    fn summary_serializes_for_json_output() {
        let snap = snapshot(3, vec![window("n1", 0, 30)]);
        let json = serde_json::to_value(zone_summary(&snap, t0())).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"zone": "uc", "total_nodes": 3, "free_nodes": 2, "windows": 1}
            ])
        );
    }

    fn arb_windows() -> impl Strategy<Value = Vec<ReservationWindow>> {
        prop::collection::vec((0u8..6, 0i64..300, 1i64..120), 0..24).prop_map(|raw| {
            raw.into_iter()
                .map(|(node, from, len)| window(&format!("n{node}"), from, from + len))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn sweep_matches_per_minute_scan(
            windows in arb_windows(),
            total in 0u32..30,
            from in 0i64..400,
            len in 1i64..200,
        ) {
            let snap = snapshot(total, windows);
            let start = t0() + Duration::minutes(from);
            let end = start + Duration::minutes(len);

            let swept = min_free_over(&snap, "uc", start, end).unwrap();
            let brute = (0..len)
                .map(|m| free_at(&snap, "uc", start + Duration::minutes(m)).unwrap())
                .min()
                .unwrap();
            prop_assert_eq!(swept, brute);
        }

        #[test]
        fn free_at_counts_covering_windows(
            windows in arb_windows(),
            total in 0u32..30,
            at in 0i64..450,
        ) {
            let t = t0() + Duration::minutes(at);
            let covering = windows.iter().filter(|w| w.start <= t && t < w.end).count() as i64;
            let snap = snapshot(total, windows);
            prop_assert_eq!(free_at(&snap, "uc", t).unwrap(), i64::from(total) - covering);
        }
    }
}
