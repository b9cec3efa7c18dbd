//! Schedule evaluation for time-windowed banners
//!
//! Everything here is a pure function of the banner and an explicit `now`.
//! Missing bounds mean "no constraint" and are never treated as errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::AdvertisingUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    /// Disabled by an administrator
    Inactive,
    /// Enabled but `now` is before the window opens
    Scheduled,
    /// Enabled but `now` is past the window
    Expired,
    Active,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Inactive => "inactive",
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::Expired => "expired",
            ScheduleStatus::Active => "active",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide whether `unit` is displayable at `now`. Both window bounds are
/// inclusive.
pub fn evaluate(unit: &AdvertisingUnit, now: DateTime<Utc>) -> ScheduleStatus {
    if !unit.active {
        return ScheduleStatus::Inactive;
    }

    match (unit.start_at, unit.end_at) {
        (None, None) => ScheduleStatus::Active,
        (Some(start_at), _) if now < start_at => ScheduleStatus::Scheduled,
        (_, Some(end_at)) if now > end_at => ScheduleStatus::Expired,
        _ => ScheduleStatus::Active,
    }
}

/// Active units of `placement`, in rotation order (`order`, then `id`)
pub fn eligible_units(
    units: &[AdvertisingUnit],
    placement: &str,
    now: DateTime<Utc>,
) -> Vec<AdvertisingUnit> {
    let mut eligible: Vec<AdvertisingUnit> = units
        .iter()
        .filter(|u| u.placement == placement && evaluate(u, now) == ScheduleStatus::Active)
        .cloned()
        .collect();
    eligible.sort_by_key(|u| (u.order, u.id));
    eligible
}

/// Number of units in each status, for admin summaries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub active: usize,
    pub scheduled: usize,
    pub expired: usize,
    pub inactive: usize,
}

pub fn status_counts(units: &[AdvertisingUnit], now: DateTime<Utc>) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for unit in units {
        match evaluate(unit, now) {
            ScheduleStatus::Active => counts.active += 1,
            ScheduleStatus::Scheduled => counts.scheduled += 1,
            ScheduleStatus::Expired => counts.expired += 1,
            ScheduleStatus::Inactive => counts.inactive += 1,
        }
    }
    counts
}

/// Countdown breakdown used for "starts in" / "ends in" labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRemaining {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
}

/// `None` once `target` is reached
pub fn time_remaining(target: DateTime<Utc>, now: DateTime<Utc>) -> Option<TimeRemaining> {
    if target <= now {
        return None;
    }

    let secs = (target - now).num_seconds();
    Some(TimeRemaining {
        days: secs / 86_400,
        hours: (secs % 86_400) / 3_600,
        minutes: (secs % 3_600) / 60,
    })
}

impl fmt::Display for TimeRemaining {
    /// Coarsest non-zero unit plus the next finer one when non-zero.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.days, self.hours, self.minutes) {
            (0, 0, 0) => f.write_str("<1m"),
            (0, 0, m) => write!(f, "{m}m"),
            (0, h, 0) => write!(f, "{h}h"),
            (0, h, m) => write!(f, "{h}h {m}m"),
            (d, 0, _) => write!(f, "{d}d"),
            (d, h, _) => write!(f, "{d}d {h}h"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    fn unit(id: i64, active: bool) -> AdvertisingUnit {
        AdvertisingUnit {
            id,
            title: format!("banner {id}"),
            placement: "header".to_string(),
            active,
            start_at: None,
            end_at: None,
            width: 728,
            height: 90,
            target_url: "https://example.org".to_string(),
            image_url: String::new(),
            order: 0,
        }
    }

    #[test]
    fn test_inactive_ignores_window() {
        let mut u = unit(1, false);
        assert_eq!(evaluate(&u, t(12, 0)), ScheduleStatus::Inactive);

        u.start_at = Some(t(10, 0));
        u.end_at = Some(t(14, 0));
        for now in [t(9, 0), t(12, 0), t(15, 0)] {
            assert_eq!(evaluate(&u, now), ScheduleStatus::Inactive);
        }
    }

    #[test]
    fn test_windowless_active_is_always_active() {
        let u = unit(1, true);
        for now in [t(0, 0), t(12, 0), t(23, 59)] {
            assert_eq!(evaluate(&u, now), ScheduleStatus::Active);
        }
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let mut u = unit(1, true);
        u.start_at = Some(t(10, 0));
        u.end_at = Some(t(14, 0));

        assert_eq!(evaluate(&u, t(9, 59)), ScheduleStatus::Scheduled);
        assert_eq!(evaluate(&u, t(10, 0)), ScheduleStatus::Active);
        assert_eq!(evaluate(&u, t(12, 0)), ScheduleStatus::Active);
        assert_eq!(evaluate(&u, t(14, 0)), ScheduleStatus::Active);
        assert_eq!(evaluate(&u, t(14, 1)), ScheduleStatus::Expired);
    }

    #[test]
    fn test_half_open_windows() {
        let mut starts = unit(1, true);
        starts.start_at = Some(t(10, 0));
        assert_eq!(evaluate(&starts, t(9, 0)), ScheduleStatus::Scheduled);
        assert_eq!(evaluate(&starts, t(23, 0)), ScheduleStatus::Active);

        let mut ends = unit(2, true);
        ends.end_at = Some(t(10, 0));
        assert_eq!(evaluate(&ends, t(0, 0)), ScheduleStatus::Active);
        assert_eq!(evaluate(&ends, t(10, 1)), ScheduleStatus::Expired);
    }

    #[test]
    fn test_eligible_units_orders_by_order_then_id() {
        let mut a = unit(3, true);
        a.order = 1;
        let mut b = unit(2, true);
        b.order = 1;
        let mut c = unit(9, true);
        c.order = 0;
        let mut expired = unit(4, true);
        expired.end_at = Some(t(1, 0));
        let mut other_slot = unit(5, true);
        other_slot.placement = "footer".to_string();

        let eligible = eligible_units(&[a, b, c, expired, other_slot, unit(6, false)], "header", t(12, 0));
        let ids: Vec<i64> = eligible.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![9, 2, 3]);
    }

    #[test]
    fn test_status_counts() {
        let mut scheduled = unit(2, true);
        scheduled.start_at = Some(t(18, 0));
        let counts = status_counts(&[unit(1, true), scheduled, unit(3, false)], t(12, 0));

        assert_eq!(
            counts,
            StatusCounts {
                active: 1,
                scheduled: 1,
                expired: 0,
                inactive: 1
            }
        );
    }

    #[test]
    fn test_time_remaining_none_when_reached() {
        assert_eq!(time_remaining(t(10, 0), t(10, 0)), None);
        assert_eq!(time_remaining(t(9, 0), t(10, 0)), None);
    }

    #[test]
    fn test_time_remaining_formats_two_coarsest_units() {
        let now = t(0, 0);
        let fmt = |delta: TimeDelta| time_remaining(now + delta, now).unwrap().to_string();

        assert_eq!(fmt(TimeDelta::days(2) + TimeDelta::hours(3) + TimeDelta::minutes(20)), "2d 3h");
        assert_eq!(fmt(TimeDelta::days(2) + TimeDelta::minutes(20)), "2d");
        assert_eq!(fmt(TimeDelta::hours(5) + TimeDelta::minutes(12)), "5h 12m");
        assert_eq!(fmt(TimeDelta::hours(5)), "5h");
        assert_eq!(fmt(TimeDelta::minutes(42) + TimeDelta::seconds(30)), "42m");
        assert_eq!(fmt(TimeDelta::seconds(30)), "<1m");
    }
}
