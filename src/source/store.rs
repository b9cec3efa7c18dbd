use async_trait::async_trait;
use chrono::FixedOffset;
use std::sync::Arc;

use super::{AnalyticsSource, SourceError};
use crate::metrics::{
    AggregateSnapshot, Aggregator, AnalyticsFilter, CostModel, Dimension, GroupedSnapshot,
};
use crate::models::MetricEvent;
use crate::storage::Storage;

/// Aggregates straight from the local store
pub struct StoreAnalyticsSource {
    storage: Arc<dyn Storage>,
    cost_model: CostModel,
    offset: FixedOffset,
}

impl StoreAnalyticsSource {
    pub fn new(storage: Arc<dyn Storage>, cost_model: CostModel, offset: FixedOffset) -> Self {
        Self {
            storage,
            cost_model,
            offset,
        }
    }

    async fn load(&self, filter: &AnalyticsFilter) -> Result<(Aggregator, Vec<MetricEvent>), SourceError> {
        let units = self.storage.list_banners(None).await?;
        let events = self.storage.list_events(&filter.range, filter.unit_id).await?;
        let aggregator = Aggregator::new(&units, self.cost_model).with_offset(self.offset);
        Ok((aggregator, events))
    }

    pub async fn breakdown(
        &self,
        filter: &AnalyticsFilter,
        dimension: Dimension,
    ) -> Result<Vec<GroupedSnapshot>, SourceError> {
        let (aggregator, events) = self.load(filter).await?;
        Ok(aggregator.group_by(&events, filter, dimension))
    }
}

#[async_trait]
impl AnalyticsSource for StoreAnalyticsSource {
    async fn summary(&self, filter: &AnalyticsFilter) -> Result<AggregateSnapshot, SourceError> {
        let (aggregator, events) = self.load(filter).await?;
        Ok(aggregator.aggregate(&events, filter))
    }
}
