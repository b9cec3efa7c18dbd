//! Where aggregate snapshots come from
//!
//! The core never queries anything itself. A source is either the local store
//! run through the aggregator, or a remote analytics endpoint returning the
//! `{ success, data }` envelope. [`CachedAnalytics`] puts the result cache in
//! front of any source.

pub mod cached;
pub mod http;
pub mod store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::{AggregateSnapshot, AnalyticsFilter};

pub use cached::CachedAnalytics;
pub use http::HttpAnalyticsSource;
pub use store::StoreAnalyticsSource;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("analytics service unreachable: {0}")]
    Network(String),
    #[error("not authorized to read analytics")]
    Unauthorized,
    #[error("analytics service responded with HTTP {0}")]
    Status(u16),
    #[error("analytics query rejected: {0}")]
    Rejected(String),
    #[error("malformed analytics response: {0}")]
    Decode(String),
    #[error("analytics store failed: {0}")]
    Store(String),
}

impl From<anyhow::Error> for SourceError {
    fn from(e: anyhow::Error) -> Self {
        SourceError::Store(format!("{e:#}"))
    }
}

/// Response envelope of the analytics endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn into_result(self) -> Result<T, SourceError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(SourceError::Decode("envelope has no data".to_string())),
            (false, _) => Err(SourceError::Rejected(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

/// Query string pairs understood by the analytics endpoint
pub fn query_pairs(filter: &AnalyticsFilter) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(start) = filter.range.start {
        pairs.push(("startDate", start.to_rfc3339()));
    }
    if let Some(end) = filter.range.end {
        pairs.push(("endDate", end.to_rfc3339()));
    }
    if let Some(unit_id) = filter.unit_id {
        pairs.push(("bannerId", unit_id.to_string()));
    }
    if let Some(placement) = &filter.placement {
        pairs.push(("position", placement.clone()));
    }
    pairs
}

#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    async fn summary(&self, filter: &AnalyticsFilter) -> Result<AggregateSnapshot, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::TimeRange;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_envelope_success() {
        let json = r#"{"success": true, "data": {"impressions": 10, "clicks": 1, "ctr": 10.0}}"#;
        let envelope: ApiEnvelope<AggregateSnapshot> = serde_json::from_str(json).unwrap();
        let snapshot = envelope.into_result().unwrap();

        assert_eq!(snapshot.impressions, 10);
        assert_eq!(snapshot.investment, 0.0);
    }

    #[test]
    fn test_envelope_failure_carries_message() {
        let json = r#"{"success": false, "error": "bannerId must be numeric"}"#;
        let envelope: ApiEnvelope<AggregateSnapshot> = serde_json::from_str(json).unwrap();

        assert_eq!(
            envelope.into_result(),
            Err(SourceError::Rejected("bannerId must be numeric".to_string()))
        );
    }

    #[test]
    fn test_query_pairs_use_endpoint_names() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let filter = AnalyticsFilter {
            range: TimeRange::new(Some(start), None),
            unit_id: Some(4),
            placement: Some("header".to_string()),
        };

        let names: Vec<&str> = query_pairs(&filter).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["startDate", "bannerId", "position"]);
    }
}
