//! Banner metrics: counts, derived ratios and bucketed breakdowns

pub mod aggregator;
pub mod models;

pub use aggregator::{top_peaks, Aggregator};
pub use models::{
    AggregateSnapshot, AnalyticsFilter, BucketKey, CostModel, Dimension, GroupedSnapshot,
    SnapshotView, TimeRange,
};
