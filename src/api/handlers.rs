use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::{ApiError, AppState};
use crate::models::{AdvertisingUnit, EventKind, MetricEvent, NewBanner};
use crate::rotation::Selection;
use crate::schedule::{eligible_units, evaluate, time_remaining, ScheduleStatus};
use crate::source::ApiEnvelope;

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}

/// A banner with its schedule state at request time
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerStatus {
    #[serde(flatten)]
    pub banner: AdvertisingUnit,
    pub status: ScheduleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_in: Option<String>,
}

impl BannerStatus {
    pub fn at(banner: AdvertisingUnit, now: DateTime<Utc>) -> Self {
        let status = evaluate(&banner, now);
        let countdown = |target: Option<DateTime<Utc>>| {
            target
                .and_then(|t| time_remaining(t, now))
                .map(|r| r.to_string())
        };
        let (starts_in, ends_in) = match status {
            ScheduleStatus::Scheduled => (countdown(banner.start_at), None),
            ScheduleStatus::Active => (None, countdown(banner.end_at)),
            _ => (None, None),
        };

        Self {
            banner,
            status,
            starts_in,
            ends_in,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub position: Option<String>,
}

/// List banners, optionally of one placement
pub async fn list_banners(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiEnvelope<Vec<BannerStatus>>>, ApiError> {
    let banners = state.storage.list_banners(query.position.as_deref()).await?;
    let now = state.clock.now();
    let banners = banners
        .into_iter()
        .map(|b| BannerStatus::at(b, now))
        .collect();
    Ok(Json(ApiEnvelope::ok(banners)))
}

/// Create a banner
pub async fn create_banner(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewBanner>,
) -> Result<(StatusCode, Json<ApiEnvelope<AdvertisingUnit>>), ApiError> {
    let banner = state.storage.create_banner(payload).await?;
    info!(id = banner.id, placement = %banner.placement, "created banner");
    Ok((StatusCode::CREATED, Json(ApiEnvelope::ok(banner))))
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

/// Enable or disable a banner
pub async fn set_banner_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<ApiEnvelope<BannerStatus>>, ApiError> {
    if !state.storage.set_active(id, payload.active).await? {
        return Err(ApiError::NotFound(format!("banner {id} not found")));
    }
    let banner = state
        .storage
        .get_banner(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("banner {id} not found")))?;
    info!(id, active = payload.active, "banner toggled");
    Ok(Json(ApiEnvelope::ok(BannerStatus::at(banner, state.clock.now()))))
}

/// What a placement shows right now
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementView {
    pub position: String,
    /// `None` when nothing is eligible and the slot should not render
    pub banner: Option<AdvertisingUnit>,
    pub index: Option<usize>,
    pub total: usize,
    /// Countdown to the end of the shown banner's window
    pub ends_in: Option<String>,
}

impl PlacementView {
    fn new(
        position: String,
        selection: Option<Selection<'_>>,
        total: usize,
        now: DateTime<Utc>,
    ) -> Self {
        match selection {
            Some(Selection { unit, index }) => Self {
                position,
                ends_in: unit
                    .end_at
                    .and_then(|end| time_remaining(end, now))
                    .map(|r| r.to_string()),
                banner: Some(unit.clone()),
                index: Some(index),
                total,
            },
            None => Self {
                position,
                banner: None,
                index: None,
                total,
                ends_in: None,
            },
        }
    }
}

/// GET /api/placements/{position}/banner
pub async fn current_banner(
    State(state): State<Arc<AppState>>,
    Path(position): Path<String>,
) -> Result<Json<ApiEnvelope<PlacementView>>, ApiError> {
    let units = state.storage.list_banners(Some(&position)).await?;
    let now = state.clock.now();
    let eligible = eligible_units(&units, &position, now);

    let selection = state.rotations.current(&position, &eligible);
    let view = PlacementView::new(position, selection, eligible.len(), now);
    Ok(Json(ApiEnvelope::ok(view)))
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub index: usize,
}

/// POST /api/placements/{position}/banner/select
///
/// Manual pick, as from a pagination dot. The rotation timer is left alone.
pub async fn select_banner(
    State(state): State<Arc<AppState>>,
    Path(position): Path<String>,
    Json(payload): Json<SelectRequest>,
) -> Result<Json<ApiEnvelope<PlacementView>>, ApiError> {
    let units = state.storage.list_banners(Some(&position)).await?;
    let now = state.clock.now();
    let eligible = eligible_units(&units, &position, now);

    if eligible.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no active banner in placement '{position}'"
        )));
    }

    let selection = state
        .rotations
        .select(&position, &eligible, payload.index)
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "index {} out of range for {} banners",
                payload.index,
                eligible.len()
            ))
        })?;
    debug!(position = %position, index = payload.index, "manual banner selection");

    let view = PlacementView::new(position, Some(selection), eligible.len(), now);
    Ok(Json(ApiEnvelope::ok(view)))
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub kind: EventKind,
    /// Defaults to the server's current time
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

/// POST /api/banners/{id}/events
pub async fn record_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<EventRequest>,
) -> Result<(StatusCode, Json<ApiEnvelope<MetricEvent>>), ApiError> {
    let event = MetricEvent {
        unit_id: id,
        kind: payload.kind,
        at: payload.at.unwrap_or_else(|| state.clock.now()),
    };
    state.storage.record_event(&event).await?;
    Ok((StatusCode::CREATED, Json(ApiEnvelope::ok(event))))
}
