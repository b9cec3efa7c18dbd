//! Event aggregation into snapshots and time/unit/placement buckets

use chrono::{FixedOffset, NaiveDate, Offset, TimeDelta, Timelike, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::metrics::models::{
    AggregateSnapshot, AnalyticsFilter, BucketKey, CostModel, Dimension, GroupedSnapshot,
};
use crate::models::{AdvertisingUnit, EventKind, MetricEvent};

const HOURS_PER_DAY: usize = 24;
const UNKNOWN_PLACEMENT: &str = "unknown";
/// Longest span that gets zero-filled day buckets
pub const MAX_FILLED_DAYS: i64 = 3660;

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    impressions: u64,
    clicks: u64,
}

impl Tally {
    fn add(&mut self, kind: EventKind) {
        match kind {
            EventKind::Impression => self.impressions += 1,
            EventKind::Click => self.clicks += 1,
        }
    }
}

/// Aggregates raw events against a known set of banners
#[derive(Debug, Clone)]
pub struct Aggregator {
    /// unit id -> placement
    placements: HashMap<i64, String>,
    cost_model: CostModel,
    /// Offset used to derive hour-of-day and calendar-day buckets
    offset: FixedOffset,
}

impl Aggregator {
    pub fn new(units: &[AdvertisingUnit], cost_model: CostModel) -> Self {
        let placements = units
            .iter()
            .map(|u| (u.id, u.placement.clone()))
            .collect();

        Self {
            placements,
            cost_model,
            offset: Utc.fix(),
        }
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    fn placement_of(&self, unit_id: i64) -> Option<&str> {
        self.placements.get(&unit_id).map(String::as_str)
    }

    fn matches(&self, event: &MetricEvent, filter: &AnalyticsFilter) -> bool {
        if !filter.range.contains(event.at) {
            return false;
        }
        if filter.unit_id.is_some_and(|id| id != event.unit_id) {
            return false;
        }
        match &filter.placement {
            Some(placement) => self.placement_of(event.unit_id) == Some(placement.as_str()),
            None => true,
        }
    }

    fn unit_matches(&self, unit_id: i64, placement: &str, filter: &AnalyticsFilter) -> bool {
        filter.unit_id.map_or(true, |id| id == unit_id)
            && filter.placement.as_deref().map_or(true, |p| p == placement)
    }

    fn snapshot(&self, tally: Tally) -> AggregateSnapshot {
        AggregateSnapshot::from_counts(tally.impressions, tally.clicks, &self.cost_model)
    }

    /// Totals for every event passing `filter`
    pub fn aggregate(&self, events: &[MetricEvent], filter: &AnalyticsFilter) -> AggregateSnapshot {
        let mut tally = Tally::default();
        for event in events.iter().filter(|e| self.matches(e, filter)) {
            tally.add(event.kind);
        }
        self.snapshot(tally)
    }

    /// Totals per bucket of `dimension`. Buckets without events are present
    /// with zero counts.
    pub fn group_by(
        &self,
        events: &[MetricEvent],
        filter: &AnalyticsFilter,
        dimension: Dimension,
    ) -> Vec<GroupedSnapshot> {
        let matching = events.iter().filter(|e| self.matches(e, filter));

        match dimension {
            Dimension::Hour => {
                let mut hours = [Tally::default(); HOURS_PER_DAY];
                for event in matching {
                    let hour = event.at.with_timezone(&self.offset).hour() as usize;
                    hours[hour].add(event.kind);
                }
                hours
                    .iter()
                    .enumerate()
                    .map(|(hour, tally)| GroupedSnapshot {
                        bucket: BucketKey::Hour(hour as u8),
                        snapshot: self.snapshot(*tally),
                    })
                    .collect()
            }
            Dimension::Day => {
                let mut days: BTreeMap<NaiveDate, Tally> = BTreeMap::new();
                for event in matching {
                    let day = event.at.with_timezone(&self.offset).date_naive();
                    days.entry(day).or_default().add(event.kind);
                }
                self.fill_days(days, filter)
            }
            Dimension::Unit => {
                let mut units: BTreeMap<i64, Tally> = self
                    .placements
                    .iter()
                    .filter(|(id, placement)| self.unit_matches(**id, placement, filter))
                    .map(|(id, _)| (*id, Tally::default()))
                    .collect();
                for event in matching {
                    units.entry(event.unit_id).or_default().add(event.kind);
                }
                units
                    .into_iter()
                    .map(|(id, tally)| GroupedSnapshot {
                        bucket: BucketKey::Unit(id),
                        snapshot: self.snapshot(tally),
                    })
                    .collect()
            }
            Dimension::Placement => {
                let mut placements: BTreeMap<String, Tally> = self
                    .placements
                    .iter()
                    .filter(|(id, placement)| self.unit_matches(**id, placement, filter))
                    .map(|(_, placement)| (placement.clone(), Tally::default()))
                    .collect();
                for event in matching {
                    let placement = self.placement_of(event.unit_id).unwrap_or(UNKNOWN_PLACEMENT);
                    placements
                        .entry(placement.to_string())
                        .or_default()
                        .add(event.kind);
                }
                placements
                    .into_iter()
                    .map(|(placement, tally)| GroupedSnapshot {
                        bucket: BucketKey::Placement(placement),
                        snapshot: self.snapshot(tally),
                    })
                    .collect()
            }
        }
    }

    /// One bucket per day from the range (or the observed events when the
    /// range is open) with gaps filled in. Spans longer than
    /// [`MAX_FILLED_DAYS`] only get the days that saw events.
    fn fill_days(
        &self,
        observed: BTreeMap<NaiveDate, Tally>,
        filter: &AnalyticsFilter,
    ) -> Vec<GroupedSnapshot> {
        let first = filter
            .range
            .start
            .map(|t| t.with_timezone(&self.offset).date_naive())
            .or_else(|| observed.keys().next().copied());
        // End is exclusive, so the last covered day is the one before it
        let last = filter
            .range
            .end
            .map(|t| (t - TimeDelta::seconds(1)).with_timezone(&self.offset).date_naive())
            .or_else(|| observed.keys().next_back().copied());

        let (Some(first), Some(last)) = (first, last) else {
            return Vec::new();
        };

        if (last - first).num_days() >= MAX_FILLED_DAYS {
            return observed
                .into_iter()
                .map(|(day, tally)| GroupedSnapshot {
                    bucket: BucketKey::Day(day),
                    snapshot: self.snapshot(tally),
                })
                .collect();
        }

        first
            .iter_days()
            .take_while(|day| *day <= last)
            .map(|day| GroupedSnapshot {
                bucket: BucketKey::Day(day),
                snapshot: self.snapshot(observed.get(&day).copied().unwrap_or_default()),
            })
            .collect()
    }
}

/// The `n` buckets with the most impressions; ties go to the earlier bucket
pub fn top_peaks(buckets: &[GroupedSnapshot], n: usize) -> Vec<GroupedSnapshot> {
    let mut ranked: Vec<(usize, &GroupedSnapshot)> = buckets.iter().enumerate().collect();
    ranked.sort_by(|(ia, a), (ib, b)| {
        b.snapshot
            .impressions
            .cmp(&a.snapshot.impressions)
            .then(ia.cmp(ib))
    });
    ranked.into_iter().take(n).map(|(_, b)| b.clone()).collect()
}
