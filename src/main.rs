use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use billboard::api::{self, AppState};
use billboard::cache::ResultCache;
use billboard::clock::{Clock, SystemClock};
use billboard::config::Config;
use billboard::source::HttpAnalyticsSource;
use billboard::storage::{SqliteStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    info!("Using SQLite storage: {}", config.database.url);
    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
    );

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut state = AppState::new(
        Arc::clone(&storage),
        clock,
        &config.cache,
        config.reporting.cost_model(),
        config.reporting.offset()?,
    );

    if let Some(endpoint) = &config.remote.endpoint {
        let mut remote = HttpAnalyticsSource::new(endpoint, config.remote.timeout())
            .with_context(|| format!("invalid ANALYTICS_ENDPOINT: {endpoint}"))?;
        if let Some(token) = &config.remote.bearer_token {
            remote = remote.with_bearer_token(token.clone());
        }
        info!("Summaries served by remote analytics endpoint {}", endpoint);
        state = state.with_summary_source(Arc::new(remote));
    }
    let state = Arc::new(state);

    // Background timers, stopped on shutdown
    let sweep_interval = config.cache.sweep_interval();
    let summary_sweeper = state.summary_cache.spawn_sweeper(sweep_interval);
    let breakdown_sweeper = state.breakdown_cache.spawn_sweeper(sweep_interval);
    let rotation_driver = state.rotations.spawn_driver(config.rotation.interval());
    info!(
        ttl_secs = config.cache.ttl_secs,
        max_entries = config.cache.max_entries,
        sweep_secs = sweep_interval.as_secs(),
        rotation_secs = config.rotation.interval().as_secs(),
        "Started cache sweepers and rotation driver"
    );

    let api_router = api::create_api_router(Arc::clone(&state));

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 API server listening on http://{}", api_addr);
    info!("   - Analytics at http://{}/api/banners/analytics", api_addr);

    axum::serve(api_listener, api_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    rotation_driver.stop().await;
    summary_sweeper.stop().await;
    breakdown_sweeper.stop().await;
    log_cache_stats("summary", &state.summary_cache);
    log_cache_stats("breakdown", &state.breakdown_cache);
    state.clear_caches();

    Ok(())
}

fn log_cache_stats<T: Clone + Send + Sync + 'static>(name: &str, cache: &ResultCache<T>) {
    let stats = cache.stats();
    info!(
        cache = name,
        hits = stats.hits,
        misses = stats.misses,
        entries = stats.entries,
        "cache stats"
    );
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
