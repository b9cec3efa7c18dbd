use crate::metrics::TimeRange;
use crate::models::{AdvertisingUnit, EventKind, MetricEvent, NewBanner};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[derive(sqlx::FromRow)]
struct BannerRow {
    id: i64,
    title: String,
    placement: String,
    is_active: bool,
    start_at: Option<i64>,
    end_at: Option<i64>,
    width: i64,
    height: i64,
    target_url: String,
    image_url: String,
    display_order: i64,
}

impl From<BannerRow> for AdvertisingUnit {
    fn from(row: BannerRow) -> Self {
        AdvertisingUnit {
            id: row.id,
            title: row.title,
            placement: row.placement,
            active: row.is_active,
            start_at: row.start_at.and_then(from_unix),
            end_at: row.end_at.and_then(from_unix),
            width: u32::try_from(row.width).unwrap_or(0),
            height: u32::try_from(row.height).unwrap_or(0),
            target_url: row.target_url,
            image_url: row.image_url,
            order: i32::try_from(row.display_order).unwrap_or(i32::MAX),
        }
    }
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Range bound in whole seconds. Events are stored at second precision, so
/// rounding up keeps `>=` and `<` in SQL equal to comparing full timestamps.
fn ceil_unix(at: DateTime<Utc>) -> i64 {
    at.timestamp() + i64::from(at.timestamp_subsec_nanos() > 0)
}

const BANNER_COLUMNS: &str = "id, title, placement, is_active, start_at, end_at, width, height, \
                              target_url, image_url, display_order";

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS banners (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                placement TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                start_at INTEGER,
                end_at INTEGER,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                target_url TEXT NOT NULL,
                image_url TEXT NOT NULL DEFAULT '',
                display_order INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_banners_placement ON banners(placement)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS banner_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                banner_id INTEGER NOT NULL REFERENCES banners(id),
                kind TEXT NOT NULL CHECK (kind IN ('impression', 'click')),
                occurred_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_banner_events_banner_time ON banner_events(banner_id, occurred_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_banner_events_time ON banner_events(occurred_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn create_banner(&self, banner: NewBanner) -> StorageResult<AdvertisingUnit> {
        banner.validate()?;

        let created_at = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO banners (title, placement, is_active, start_at, end_at, width, height,
                                 target_url, image_url, display_order, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&banner.title)
        .bind(&banner.placement)
        .bind(banner.active)
        .bind(banner.start_at.map(|t| t.timestamp()))
        .bind(banner.end_at.map(|t| t.timestamp()))
        .bind(i64::from(banner.width))
        .bind(i64::from(banner.height))
        .bind(&banner.target_url)
        .bind(&banner.image_url)
        .bind(i64::from(banner.order))
        .bind(created_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        let id = result.last_insert_rowid();
        tracing::debug!(banner_id = id, placement = %banner.placement, "banner created");

        // Stored timestamps have second precision
        let mut unit = banner.into_unit(id);
        unit.start_at = unit.start_at.map(|t| t.timestamp()).and_then(from_unix);
        unit.end_at = unit.end_at.map(|t| t.timestamp()).and_then(from_unix);
        Ok(unit)
    }

    async fn get_banner(&self, id: i64) -> Result<Option<AdvertisingUnit>> {
        let row = sqlx::query_as::<_, BannerRow>(&format!(
            "SELECT {BANNER_COLUMNS} FROM banners WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(AdvertisingUnit::from))
    }

    async fn list_banners(&self, placement: Option<&str>) -> Result<Vec<AdvertisingUnit>> {
        let rows = if let Some(placement) = placement {
            sqlx::query_as::<_, BannerRow>(&format!(
                "SELECT {BANNER_COLUMNS} FROM banners WHERE placement = ? ORDER BY display_order, id"
            ))
            .bind(placement)
            .fetch_all(self.pool.as_ref())
            .await?
        } else {
            sqlx::query_as::<_, BannerRow>(&format!(
                "SELECT {BANNER_COLUMNS} FROM banners ORDER BY placement, display_order, id"
            ))
            .fetch_all(self.pool.as_ref())
            .await?
        };

        Ok(rows.into_iter().map(AdvertisingUnit::from).collect())
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE banners SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_event(&self, event: &MetricEvent) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO banner_events (banner_id, kind, occurred_at)
            SELECT ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM banners WHERE id = ?)
            "#,
        )
        .bind(event.unit_id)
        .bind(event.kind.as_str())
        .bind(event.at.timestamp())
        .bind(event.unit_id)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(event.unit_id));
        }
        Ok(())
    }

    async fn list_events(&self, range: &TimeRange, unit_id: Option<i64>) -> Result<Vec<MetricEvent>> {
        let mut sql = String::from("SELECT banner_id, kind, occurred_at FROM banner_events WHERE 1 = 1");
        if range.start.is_some() {
            sql.push_str(" AND occurred_at >= ?");
        }
        if range.end.is_some() {
            sql.push_str(" AND occurred_at < ?");
        }
        if unit_id.is_some() {
            sql.push_str(" AND banner_id = ?");
        }
        sql.push_str(" ORDER BY occurred_at, id");

        let mut query = sqlx::query_as::<_, (i64, String, i64)>(&sql);
        if let Some(start) = range.start {
            query = query.bind(ceil_unix(start));
        }
        if let Some(end) = range.end {
            query = query.bind(ceil_unix(end));
        }
        if let Some(unit_id) = unit_id {
            query = query.bind(unit_id);
        }

        query
            .fetch_all(self.pool.as_ref())
            .await?
            .into_iter()
            .map(|(unit_id, kind, occurred_at)| -> Result<MetricEvent> {
                let kind: EventKind = kind.parse().map_err(|e: String| anyhow!(e))?;
                let at = from_unix(occurred_at)
                    .ok_or_else(|| anyhow!("event timestamp {occurred_at} out of range"))?;
                Ok(MetricEvent { unit_id, kind, at })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    async fn setup_sqlite() -> SqliteStorage {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        storage
    }

    fn banner(placement: &str, order: i32) -> NewBanner {
        NewBanner {
            title: format!("{placement} #{order}"),
            placement: placement.to_string(),
            active: true,
            start_at: None,
            end_at: None,
            width: 728,
            height: 90,
            target_url: "https://example.org".to_string(),
            image_url: String::new(),
            order,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_banner() {
        let storage = setup_sqlite().await;
        let mut new = banner("header", 1);
        new.start_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap());

        let created = storage.create_banner(new).await.unwrap();
        let fetched = storage.get_banner(created.id).await.unwrap().unwrap();

        assert_eq!(fetched, created);
        assert!(storage.get_banner(created.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_window_is_rejected() {
        let storage = setup_sqlite().await;
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let mut new = banner("header", 1);
        new.start_at = Some(t);
        new.end_at = Some(t - TimeDelta::hours(1));

        let err = storage.create_banner(new).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidBanner(_)));
        assert!(storage.list_banners(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_banners_by_placement_in_order() {
        let storage = setup_sqlite().await;
        storage.create_banner(banner("header", 2)).await.unwrap();
        storage.create_banner(banner("sidebar", 0)).await.unwrap();
        storage.create_banner(banner("header", 1)).await.unwrap();

        let header = storage.list_banners(Some("header")).await.unwrap();
        let orders: Vec<i32> = header.iter().map(|b| b.order).collect();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(storage.list_banners(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_set_active() {
        let storage = setup_sqlite().await;
        let created = storage.create_banner(banner("header", 0)).await.unwrap();

        assert!(storage.set_active(created.id, false).await.unwrap());
        assert!(!storage.get_banner(created.id).await.unwrap().unwrap().active);
        assert!(!storage.set_active(9999, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_events_filtered_by_range_and_banner() {
        let storage = setup_sqlite().await;
        let a = storage.create_banner(banner("header", 0)).await.unwrap();
        let b = storage.create_banner(banner("header", 1)).await.unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();

        storage.record_event(&MetricEvent::impression(a.id, t0)).await.unwrap();
        storage
            .record_event(&MetricEvent::click(a.id, t0 + TimeDelta::minutes(5)))
            .await
            .unwrap();
        storage
            .record_event(&MetricEvent::impression(b.id, t0 + TimeDelta::hours(2)))
            .await
            .unwrap();

        let all = storage.list_events(&TimeRange::default(), None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].kind, EventKind::Click);

        let first_hour = TimeRange::between(t0, t0 + TimeDelta::hours(1));
        assert_eq!(storage.list_events(&first_hour, None).await.unwrap().len(), 2);
        assert_eq!(storage.list_events(&TimeRange::default(), Some(b.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_event_for_unknown_banner_is_rejected() {
        let storage = setup_sqlite().await;
        let err = storage
            .record_event(&MetricEvent::impression(42, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(42)));
    }
}
