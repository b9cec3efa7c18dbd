use crate::metrics::TimeRange;
use crate::models::{AdvertisingUnit, BannerError, MetricEvent, NewBanner};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    InvalidBanner(#[from] BannerError),
    #[error("banner {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistent banners and their impression/click log
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Validate and insert a banner, returning it with its assigned id
    async fn create_banner(&self, banner: NewBanner) -> StorageResult<AdvertisingUnit>;

    async fn get_banner(&self, id: i64) -> Result<Option<AdvertisingUnit>>;

    /// All banners, or only those of one placement, ordered by rotation order
    async fn list_banners(&self, placement: Option<&str>) -> Result<Vec<AdvertisingUnit>>;

    /// Toggle the administrative enable flag
    async fn set_active(&self, id: i64, active: bool) -> Result<bool>;

    /// Append an event; fails with `NotFound` for an unknown banner
    async fn record_event(&self, event: &MetricEvent) -> StorageResult<()>;

    /// Events inside `range`, optionally for a single banner, oldest first
    async fn list_events(&self, range: &TimeRange, unit_id: Option<i64>) -> Result<Vec<MetricEvent>>;
}
