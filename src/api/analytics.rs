//! Analytics API handlers

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::cache::generate_key;
use crate::compare::{compare, compare_periods, ComparisonResult, PeriodComparison};
use crate::export::{grouped_rows, snapshot_row, ExportFormat};
use crate::metrics::{
    top_peaks, AggregateSnapshot, AnalyticsFilter, Dimension, GroupedSnapshot, TimeRange,
};
use crate::source::{AnalyticsSource, ApiEnvelope};

/// Trend window when the query leaves the start open
const DEFAULT_TREND_DAYS: i64 = 7;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    /// RFC 3339 instant or `YYYY-MM-DD`
    pub start_date: Option<String>,
    /// RFC 3339 instant or `YYYY-MM-DD` (whole day included)
    pub end_date: Option<String>,
    pub banner_id: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    Start,
    End,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_banner_id(name: &str, raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::bad_request(format!("{name} must be numeric, got '{raw}'")))
}

/// Parse a query date. A bare date is midnight in `offset`; as an end bound
/// it becomes the following midnight so the whole day is included.
pub fn parse_date(
    raw: &str,
    bound: DateBound,
    offset: FixedOffset,
) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }

    let invalid = || {
        ApiError::bad_request(format!(
            "invalid date '{raw}', expected YYYY-MM-DD or an RFC 3339 timestamp"
        ))
    };
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
    let date = match bound {
        DateBound::Start => date,
        DateBound::End => date.succ_opt().ok_or_else(invalid)?,
    };

    date.and_time(NaiveTime::MIN)
        .and_local_timezone(offset)
        .single()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(invalid)
}

impl AnalyticsQuery {
    pub fn range(&self, offset: FixedOffset) -> Result<TimeRange, ApiError> {
        let start = non_empty(&self.start_date)
            .map(|raw| parse_date(raw, DateBound::Start, offset))
            .transpose()?;
        let end = non_empty(&self.end_date)
            .map(|raw| parse_date(raw, DateBound::End, offset))
            .transpose()?;

        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                return Err(ApiError::bad_request("endDate must be after startDate"));
            }
        }
        Ok(TimeRange::new(start, end))
    }

    pub fn to_filter(&self, offset: FixedOffset) -> Result<AnalyticsFilter, ApiError> {
        let unit_id = non_empty(&self.banner_id)
            .map(|raw| parse_banner_id("bannerId", raw))
            .transpose()?;

        Ok(AnalyticsFilter {
            range: self.range(offset)?,
            unit_id,
            placement: non_empty(&self.position).map(str::to_string),
        })
    }
}

/// Bucketed breakdown, cached alongside the summaries
async fn breakdown(
    state: &AppState,
    filter: &AnalyticsFilter,
    dimension: Dimension,
) -> Result<Vec<GroupedSnapshot>, ApiError> {
    let key = generate_key(&filter.to_params().with("groupBy", dimension.as_str()));
    let buckets = state
        .breakdown_cache
        .get_or_try_insert_with(&key, || state.store_source.breakdown(filter, dimension))
        .await?;
    Ok(buckets)
}

/// GET /api/banners/analytics
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<ApiEnvelope<AggregateSnapshot>>, ApiError> {
    let filter = query.to_filter(state.offset)?;
    let snapshot = state.summaries.summary(&filter).await?;
    Ok(Json(ApiEnvelope::ok(snapshot)))
}

#[derive(Debug, Deserialize)]
pub struct PeaksQuery {
    #[serde(default = "default_peaks")]
    pub peaks: usize,
}

fn default_peaks() -> usize {
    3
}

#[derive(Debug, Serialize)]
pub struct HourlyResponse {
    pub buckets: Vec<GroupedSnapshot>,
    pub peaks: Vec<GroupedSnapshot>,
}

/// GET /api/banners/analytics/hourly
pub async fn get_hourly(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
    Query(peaks): Query<PeaksQuery>,
) -> Result<Json<ApiEnvelope<HourlyResponse>>, ApiError> {
    let filter = query.to_filter(state.offset)?;
    let buckets = breakdown(&state, &filter, Dimension::Hour).await?;
    let peaks = top_peaks(&buckets, peaks.peaks.min(buckets.len()));

    Ok(Json(ApiEnvelope::ok(HourlyResponse { buckets, peaks })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareQuery {
    pub banner_a: Option<String>,
    pub banner_b: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResponse {
    pub banner_a: i64,
    pub banner_b: i64,
    #[serde(flatten)]
    pub result: ComparisonResult,
}

/// GET /api/banners/analytics/compare?bannerA=&bannerB=
pub async fn get_comparison(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
    Query(pair): Query<CompareQuery>,
) -> Result<Json<ApiEnvelope<CompareResponse>>, ApiError> {
    let required = |name: &str, value: &Option<String>| -> Result<i64, ApiError> {
        let raw = non_empty(value)
            .ok_or_else(|| ApiError::bad_request(format!("{name} is required")))?;
        parse_banner_id(name, raw)
    };
    let banner_a = required("bannerA", &pair.banner_a)?;
    let banner_b = required("bannerB", &pair.banner_b)?;

    for id in [banner_a, banner_b] {
        if state.storage.get_banner(id).await?.is_none() {
            return Err(ApiError::NotFound(format!("banner {id} not found")));
        }
    }

    let range = query.range(state.offset)?;
    let a = state
        .summaries
        .summary(&AnalyticsFilter::for_unit(banner_a, range))
        .await?;
    let b = state
        .summaries
        .summary(&AnalyticsFilter::for_unit(banner_b, range))
        .await?;

    Ok(Json(ApiEnvelope::ok(CompareResponse {
        banner_a,
        banner_b,
        result: compare(&a, &b),
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendResponse {
    pub range: TimeRange,
    pub previous_range: TimeRange,
    #[serde(flatten)]
    pub comparison: PeriodComparison,
}

/// GET /api/banners/analytics/trend
///
/// Compares the requested window with the equally long window before it. An
/// open end means now; an open start means seven days before the end.
pub async fn get_trend(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<ApiEnvelope<TrendResponse>>, ApiError> {
    let filter = query.to_filter(state.offset)?;
    let end = filter.range.end.unwrap_or_else(|| state.clock.now());
    let start = filter
        .range
        .start
        .unwrap_or(end - TimeDelta::days(DEFAULT_TREND_DAYS));
    if end <= start {
        return Err(ApiError::bad_request("endDate must be after startDate"));
    }

    let range = TimeRange::between(start, end);
    let previous_range = range
        .previous()
        .ok_or_else(|| ApiError::bad_request("trend needs a closed date range"))?;

    let current = state
        .summaries
        .summary(&AnalyticsFilter {
            range,
            ..filter.clone()
        })
        .await?;
    let previous = state
        .summaries
        .summary(&AnalyticsFilter {
            range: previous_range,
            ..filter
        })
        .await?;

    Ok(Json(ApiEnvelope::ok(TrendResponse {
        range,
        previous_range,
        comparison: compare_periods(&current, &previous),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    pub format: Option<String>,
    pub group_by: Option<String>,
}

/// GET /api/banners/analytics/export?format=csv|tsv|html
///
/// One row per bucket followed by a total row.
pub async fn export_report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
    Query(export): Query<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let format = match non_empty(&export.format) {
        Some(raw) => raw.parse::<ExportFormat>().map_err(ApiError::BadRequest)?,
        None => ExportFormat::default(),
    };
    let dimension = match non_empty(&export.group_by) {
        Some(raw) => raw.parse::<Dimension>().map_err(ApiError::BadRequest)?,
        None => Dimension::Hour,
    };

    let filter = query.to_filter(state.offset)?;
    let buckets = breakdown(&state, &filter, dimension).await?;

    let mut total = AggregateSnapshot::default();
    for bucket in &buckets {
        total.merge(&bucket.snapshot);
    }
    let mut rows = grouped_rows(&buckets);
    rows.push(snapshot_row("total", &total));

    let disposition = format!(
        "attachment; filename=\"banner-analytics.{}\"",
        format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        format.render(&rows),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset, TimeZone};

    fn utc() -> FixedOffset {
        Utc.fix()
    }

    #[test]
    fn test_parse_date_accepts_both_forms() {
        let start = parse_date("2024-06-01", DateBound::Start, utc()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());

        let exact = parse_date("2024-06-01T10:30:00+02:00", DateBound::End, utc()).unwrap();
        assert_eq!(exact, Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_end_date_includes_whole_day() {
        let end = parse_date("2024-06-01", DateBound::End, utc()).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_bare_dates_follow_reporting_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let start = parse_date("2024-06-01", DateBound::Start, offset).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 31, 22, 0, 0).unwrap());
    }

    #[test]
    fn test_to_filter_validation() {
        let query = AnalyticsQuery {
            banner_id: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.to_filter(utc()), Err(ApiError::BadRequest(_))));

        let query = AnalyticsQuery {
            start_date: Some("2024-06-02".to_string()),
            end_date: Some("2024-06-01".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.to_filter(utc()), Err(ApiError::BadRequest(_))));

        // Same day on both sides is a one-day window
        let query = AnalyticsQuery {
            start_date: Some("2024-06-01".to_string()),
            end_date: Some("2024-06-01".to_string()),
            position: Some(" ".to_string()),
            ..Default::default()
        };
        let filter = query.to_filter(utc()).unwrap();
        assert_eq!(filter.placement, None);
        assert_eq!(
            filter.range.end.unwrap() - filter.range.start.unwrap(),
            TimeDelta::days(1)
        );
    }
}
