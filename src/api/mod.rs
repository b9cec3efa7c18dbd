//! HTTP surface: placement rotation, event intake and the analytics endpoints

pub mod analytics;
pub mod error;
pub mod handlers;
pub mod routes;

use chrono::FixedOffset;
use std::sync::Arc;

use crate::cache::ResultCache;
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::metrics::{AggregateSnapshot, CostModel, GroupedSnapshot};
use crate::rotation::PlacementRotations;
use crate::source::{AnalyticsSource, CachedAnalytics, StoreAnalyticsSource};
use crate::storage::Storage;

pub use error::ApiError;
pub use routes::create_api_router;

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub rotations: Arc<PlacementRotations>,
    /// Uncached aggregation over the store
    pub store_source: Arc<StoreAnalyticsSource>,
    /// Summaries, served through `summary_cache`. Backed by the store unless
    /// replaced with [`AppState::with_summary_source`].
    pub summaries: CachedAnalytics,
    pub summary_cache: Arc<ResultCache<AggregateSnapshot>>,
    pub breakdown_cache: Arc<ResultCache<Vec<GroupedSnapshot>>>,
    pub clock: Arc<dyn Clock>,
    /// Offset in which `YYYY-MM-DD` query dates are read
    pub offset: FixedOffset,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        cache: &CacheConfig,
        cost_model: CostModel,
        offset: FixedOffset,
    ) -> Self {
        let store_source = Arc::new(StoreAnalyticsSource::new(
            Arc::clone(&storage),
            cost_model,
            offset,
        ));
        let summary_cache = Arc::new(ResultCache::from_config(cache, Arc::clone(&clock)));
        let breakdown_cache = Arc::new(ResultCache::from_config(cache, Arc::clone(&clock)));
        let summaries = CachedAnalytics::new(
            Arc::clone(&store_source) as Arc<dyn AnalyticsSource>,
            Arc::clone(&summary_cache),
        );

        Self {
            storage,
            rotations: Arc::new(PlacementRotations::new()),
            store_source,
            summaries,
            summary_cache,
            breakdown_cache,
            clock,
            offset,
        }
    }

    /// Serve summaries, comparisons and trends from `source`. Breakdowns and
    /// exports still aggregate the local store.
    pub fn with_summary_source(mut self, source: Arc<dyn AnalyticsSource>) -> Self {
        self.summaries = CachedAnalytics::new(source, Arc::clone(&self.summary_cache));
        self
    }

    /// Drop every cached result
    pub fn clear_caches(&self) {
        self.summary_cache.clear();
        self.breakdown_cache.clear();
    }
}
