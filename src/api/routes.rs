use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::analytics::{export_report, get_comparison, get_hourly, get_summary, get_trend};
use super::handlers::{
    create_banner, current_banner, health_check, list_banners, record_event, select_banner,
    set_banner_active,
};
use super::AppState;

pub fn create_api_router(state: Arc<AppState>) -> Router {
    let analytics_routes = Router::new()
        .route("/", get(get_summary))
        .route("/hourly", get(get_hourly))
        .route("/compare", get(get_comparison))
        .route("/trend", get(get_trend))
        .route("/export", get(export_report));

    let api_routes = Router::new()
        .nest("/banners/analytics", analytics_routes)
        .route("/banners", get(list_banners).post(create_banner))
        .route("/banners/{id}/active", put(set_banner_active))
        .route("/banners/{id}/events", post(record_event))
        .route("/placements/{position}/banner", get(current_banner))
        .route("/placements/{position}/banner/select", post(select_banner));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
