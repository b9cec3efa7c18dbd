//! A/B and period-over-period comparison of aggregate snapshots

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::metrics::AggregateSnapshot;

/// Below this many impressions on either side a comparison carries no
/// confidence.
pub const MIN_IMPRESSIONS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Winner {
    A,
    B,
    #[serde(rename = "tie")]
    Tie,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub a: AggregateSnapshot,
    pub b: AggregateSnapshot,
    pub winner: Winner,
    /// 0..=100
    pub confidence: f64,
}

/// Percentage change from `baseline` to `current`. A zero baseline reports
/// 100 for any new activity and 0 otherwise.
pub fn delta(current: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        return if current > 0.0 { 100.0 } else { 0.0 };
    }
    let change = (current - baseline) / baseline * 100.0;
    if change.is_finite() {
        change
    } else {
        0.0
    }
}

/// Compare two snapshots by CTR
pub fn compare(a: &AggregateSnapshot, b: &AggregateSnapshot) -> ComparisonResult {
    let (ctr_a, ctr_b) = (a.ctr(), b.ctr());
    let winner = if ctr_a > ctr_b {
        Winner::A
    } else if ctr_b > ctr_a {
        Winner::B
    } else {
        Winner::Tie
    };

    ComparisonResult {
        a: *a,
        b: *b,
        winner,
        confidence: confidence(a, b),
    }
}

/// Two-proportion z-test on click-through, reported as `(1 - p) * 100`
/// for the two-sided p-value.
pub fn confidence(a: &AggregateSnapshot, b: &AggregateSnapshot) -> f64 {
    if a.impressions < MIN_IMPRESSIONS || b.impressions < MIN_IMPRESSIONS {
        return 0.0;
    }

    let (n_a, n_b) = (a.impressions as f64, b.impressions as f64);
    let pooled = (a.clicks + b.clicks) as f64 / (n_a + n_b);
    let std_err = (pooled * (1.0 - pooled) * (1.0 / n_a + 1.0 / n_b)).sqrt();
    if !std_err.is_finite() || std_err <= 0.0 {
        return 0.0;
    }

    let z = (a.ctr() - b.ctr()).abs() / std_err;
    let Ok(normal) = Normal::new(0.0, 1.0) else {
        return 0.0;
    };

    let score = (2.0 * normal.cdf(z) - 1.0) * 100.0;
    score.clamp(0.0, 100.0)
}

/// Change of each metric from a prior period to the current one, in percent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparison {
    pub current: AggregateSnapshot,
    pub previous: AggregateSnapshot,
    pub impressions_change: f64,
    pub clicks_change: f64,
    pub ctr_change: f64,
    pub investment_change: f64,
    pub revenue_change: f64,
}

pub fn compare_periods(current: &AggregateSnapshot, previous: &AggregateSnapshot) -> PeriodComparison {
    PeriodComparison {
        current: *current,
        previous: *previous,
        impressions_change: delta(current.impressions as f64, previous.impressions as f64),
        clicks_change: delta(current.clicks as f64, previous.clicks as f64),
        ctr_change: delta(current.ctr(), previous.ctr()),
        investment_change: delta(current.investment, previous.investment),
        revenue_change: delta(current.revenue, previous.revenue),
    }
}
