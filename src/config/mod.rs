use anyhow::Context;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::metrics::CostModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub cache: CacheConfig,
    pub rotation: RotationConfig,
    pub reporting: ReportingConfig,
    pub remote: RemoteSourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 50,
            sweep_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    pub interval_secs: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

impl RotationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Pricing and time zone used when turning events into reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    pub cost_per_impression: f64,
    pub revenue_per_click: f64,
    /// Offset from UTC for hour and day buckets
    pub utc_offset_minutes: i32,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            cost_per_impression: 0.01,
            revenue_per_click: 0.0,
            utc_offset_minutes: 0,
        }
    }
}

impl ReportingConfig {
    pub fn cost_model(&self) -> CostModel {
        CostModel {
            cost_per_impression: self.cost_per_impression,
            revenue_per_click: self.revenue_per_click,
        }
    }

    pub fn offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).with_context(|| {
            format!(
                "REPORT_UTC_OFFSET_MINUTES out of range: {}",
                self.utc_offset_minutes
            )
        })
    }
}

/// Remote analytics endpoint that replaces local aggregation for summaries.
/// Disabled while `endpoint` is unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSourceConfig {
    pub endpoint: Option<String>,
    pub bearer_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bearer_token: None,
            timeout_secs: 10,
        }
    }
}

impl RemoteSourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Unset and blank variables both read as `None`
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read `name`, falling back to `default` when unset. A value that is set but
/// does not parse is an error.
fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./billboard.db".to_string());
        let max_connections = env_or("DATABASE_MAX_CONNECTIONS", 5u32)?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = env_or("API_PORT", 8080u16)?;

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            ttl_secs: env_or("CACHE_TTL_SECS", cache_defaults.ttl_secs)?,
            max_entries: env_or("CACHE_MAX_ENTRIES", cache_defaults.max_entries)?,
            sweep_interval_secs: env_or(
                "CACHE_SWEEP_INTERVAL_SECS",
                cache_defaults.sweep_interval_secs,
            )?,
        };

        let rotation = RotationConfig {
            interval_secs: env_or("ROTATION_INTERVAL_SECS", RotationConfig::default().interval_secs)?,
        };

        let reporting_defaults = ReportingConfig::default();
        let reporting = ReportingConfig {
            cost_per_impression: env_or(
                "COST_PER_IMPRESSION",
                reporting_defaults.cost_per_impression,
            )?,
            revenue_per_click: env_or("REVENUE_PER_CLICK", reporting_defaults.revenue_per_click)?,
            utc_offset_minutes: env_or(
                "REPORT_UTC_OFFSET_MINUTES",
                reporting_defaults.utc_offset_minutes,
            )?,
        };
        reporting.offset()?;

        let remote = RemoteSourceConfig {
            endpoint: env_opt("ANALYTICS_ENDPOINT"),
            bearer_token: env_opt("ANALYTICS_TOKEN"),
            timeout_secs: env_or(
                "ANALYTICS_TIMEOUT_SECS",
                RemoteSourceConfig::default().timeout_secs,
            )?,
        };

        if cache.max_entries == 0 {
            tracing::warn!("CACHE_MAX_ENTRIES is 0, the cache will hold a single entry");
        }

        Ok(Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            cache,
            rotation,
            reporting,
            remote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cache = CacheConfig::default();
        assert_eq!(cache.ttl(), Duration::from_secs(300));
        assert_eq!(cache.max_entries, 50);
        assert_eq!(RotationConfig::default().interval(), Duration::from_secs(5));

        let reporting = ReportingConfig::default();
        assert_eq!(reporting.cost_model().cost_per_impression, 0.01);
        assert_eq!(reporting.offset().unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn test_offset_out_of_range() {
        let reporting = ReportingConfig {
            utc_offset_minutes: 24 * 60,
            ..Default::default()
        };
        assert!(reporting.offset().is_err());

        let reporting = ReportingConfig {
            utc_offset_minutes: -180,
            ..Default::default()
        };
        assert_eq!(reporting.offset().unwrap().local_minus_utc(), -3 * 3600);
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        // Unique name so parallel tests never race on it
        std::env::set_var("BILLBOARD_TEST_ENV_OR_GARBAGE", "five");
        let err = env_or("BILLBOARD_TEST_ENV_OR_GARBAGE", 5u64).unwrap_err();
        assert!(err.to_string().contains("BILLBOARD_TEST_ENV_OR_GARBAGE"));

        assert_eq!(env_or("BILLBOARD_TEST_ENV_OR_UNSET", 7u64).unwrap(), 7);
    }

    #[test]
    fn test_remote_source_off_by_default() {
        let remote = RemoteSourceConfig::default();
        assert!(remote.endpoint.is_none());
        assert_eq!(remote.timeout(), Duration::from_secs(10));

        std::env::set_var("BILLBOARD_TEST_ENV_OPT_BLANK", "  ");
        assert_eq!(env_opt("BILLBOARD_TEST_ENV_OPT_BLANK"), None);
        std::env::set_var("BILLBOARD_TEST_ENV_OPT_SET", " https://stats.example ");
        assert_eq!(
            env_opt("BILLBOARD_TEST_ENV_OPT_SET").as_deref(),
            Some("https://stats.example")
        );
    }
}
