use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::warn;

use super::{query_pairs, AnalyticsSource, ApiEnvelope, SourceError};
use crate::metrics::{AggregateSnapshot, AnalyticsFilter};

/// Remote analytics endpoint. Failures are reported once; retrying is up to
/// the caller.
pub struct HttpAnalyticsSource {
    client: reqwest::Client,
    endpoint: Url,
    bearer_token: Option<String>,
}

impl HttpAnalyticsSource {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn url_for(&self, filter: &AnalyticsFilter) -> Url {
        let mut url = self.endpoint.clone();
        let pairs = query_pairs(filter);
        if !pairs.is_empty() {
            let mut query = url.query_pairs_mut();
            for (name, value) in &pairs {
                query.append_pair(name, value);
            }
        }
        url
    }
}

#[async_trait]
impl AnalyticsSource for HttpAnalyticsSource {
    async fn summary(&self, filter: &AnalyticsFilter) -> Result<AggregateSnapshot, SourceError> {
        let mut request = self.client.get(self.url_for(filter));
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Unauthorized);
        }

        let envelope = match response.json::<ApiEnvelope<AggregateSnapshot>>().await {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(SourceError::Decode(e.to_string())),
            Err(_) => return Err(SourceError::Status(status.as_u16())),
        };

        envelope.into_result().inspect_err(|e| {
            warn!(status = status.as_u16(), error = %e, "analytics endpoint returned failure");
        })
    }
}
