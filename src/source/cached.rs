use async_trait::async_trait;
use std::sync::Arc;

use super::{AnalyticsSource, SourceError};
use crate::cache::{generate_key, ResultCache};
use crate::metrics::{AggregateSnapshot, AnalyticsFilter};

/// Source wrapper serving repeated queries from the result cache.
///
/// Results may be stale by up to the cache TTL. Failed fetches are returned
/// to the caller and never stored.
pub struct CachedAnalytics {
    inner: Arc<dyn AnalyticsSource>,
    cache: Arc<ResultCache<AggregateSnapshot>>,
}

impl CachedAnalytics {
    pub fn new(inner: Arc<dyn AnalyticsSource>, cache: Arc<ResultCache<AggregateSnapshot>>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<ResultCache<AggregateSnapshot>> {
        &self.cache
    }
}

#[async_trait]
impl AnalyticsSource for CachedAnalytics {
    async fn summary(&self, filter: &AnalyticsFilter) -> Result<AggregateSnapshot, SourceError> {
        let key = generate_key(&filter.to_params());
        self.cache
            .get_or_try_insert_with(&key, || self.inner.summary(filter))
            .await
    }
}
