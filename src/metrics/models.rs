//! Data models for banner metrics

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cache::QueryParams;

/// Half-open time window `[start, end)`. Missing bounds are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at < end)
    }

    /// Window of the same length ending where this one starts. Only defined
    /// for closed ranges.
    pub fn previous(&self) -> Option<TimeRange> {
        let (start, end) = (self.start?, self.end?);
        let len = end - start;
        Some(TimeRange::between(start - len, start))
    }
}

/// Pricing applied to raw counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostModel {
    pub cost_per_impression: f64,
    pub revenue_per_click: f64,
}

/// Totals for a set of events.
///
/// Only the counts and money totals are stored. CTR, ROI and ROAS are
/// recomputed on every call and appear in serialized output only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "SnapshotView", rename_all = "camelCase")]
pub struct AggregateSnapshot {
    pub impressions: u64,
    pub clicks: u64,
    #[serde(default)]
    pub investment: f64,
    #[serde(default)]
    pub revenue: f64,
}

impl AggregateSnapshot {
    pub fn from_counts(impressions: u64, clicks: u64, cost_model: &CostModel) -> Self {
        Self {
            impressions,
            clicks,
            investment: impressions as f64 * cost_model.cost_per_impression,
            revenue: clicks as f64 * cost_model.revenue_per_click,
        }
    }

    /// Replace the revenue with an externally reported figure
    pub fn with_revenue(mut self, revenue: f64) -> Self {
        self.revenue = revenue;
        self
    }

    /// Click-through ratio in `[0, 1]`, 0 without impressions
    pub fn ctr(&self) -> f64 {
        if self.impressions == 0 {
            return 0.0;
        }
        self.clicks as f64 / self.impressions as f64
    }

    pub fn ctr_percent(&self) -> f64 {
        self.ctr() * 100.0
    }

    /// Return on investment in percent, 0 without investment
    pub fn roi(&self) -> f64 {
        if self.investment == 0.0 {
            return 0.0;
        }
        finite_or_zero((self.revenue - self.investment) / self.investment * 100.0)
    }

    /// Return on ad spend, 0 without investment
    pub fn roas(&self) -> f64 {
        if self.investment == 0.0 {
            return 0.0;
        }
        finite_or_zero(self.revenue / self.investment)
    }

    pub fn merge(&mut self, other: &AggregateSnapshot) {
        self.impressions += other.impressions;
        self.clicks += other.clicks;
        self.investment += other.investment;
        self.revenue += other.revenue;
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Wire shape of [`AggregateSnapshot`]; `ctr` is a percentage
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotView {
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: f64,
    pub investment: f64,
    pub revenue: f64,
    pub roi: f64,
    pub roas: f64,
}

impl From<AggregateSnapshot> for SnapshotView {
    fn from(s: AggregateSnapshot) -> Self {
        Self {
            impressions: s.impressions,
            clicks: s.clicks,
            ctr: s.ctr_percent(),
            investment: s.investment,
            revenue: s.revenue,
            roi: s.roi(),
            roas: s.roas(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// 24 buckets, hour of day in the reporting offset
    #[serde(alias = "hourofday")]
    Hour,
    Day,
    Unit,
    Placement,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Hour => "hour",
            Dimension::Day => "day",
            Dimension::Unit => "unit",
            Dimension::Placement => "placement",
        }
    }
}

impl std::str::FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hour" | "hourofday" => Ok(Dimension::Hour),
            "day" => Ok(Dimension::Day),
            "unit" | "banner" => Ok(Dimension::Unit),
            "placement" | "position" => Ok(Dimension::Placement),
            other => Err(format!("unknown dimension '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BucketKey {
    Hour(u8),
    Day(NaiveDate),
    Unit(i64),
    Placement(String),
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Hour(h) => write!(f, "{h:02}:00"),
            BucketKey::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            BucketKey::Unit(id) => write!(f, "{id}"),
            BucketKey::Placement(p) => f.write_str(p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedSnapshot {
    pub bucket: BucketKey,
    #[serde(flatten)]
    pub snapshot: AggregateSnapshot,
}

/// Filter applied to events before aggregation. Also the cache key input for
/// aggregate queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsFilter {
    #[serde(default)]
    pub range: TimeRange,
    #[serde(default)]
    pub unit_id: Option<i64>,
    #[serde(default)]
    pub placement: Option<String>,
}

impl AnalyticsFilter {
    pub fn for_unit(unit_id: i64, range: TimeRange) -> Self {
        Self {
            range,
            unit_id: Some(unit_id),
            placement: None,
        }
    }

    /// Canonical parameters, named like the analytics endpoint's query string
    pub fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params.insert_opt("startDate", self.range.start.map(|t| t.to_rfc3339()));
        params.insert_opt("endDate", self.range.end.map(|t| t.to_rfc3339()));
        params.insert_opt("bannerId", self.unit_id);
        params.insert_opt("position", self.placement.clone());
        params
    }
}
