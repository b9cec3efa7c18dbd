use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use billboard::api::analytics::{parse_date, DateBound};
use billboard::compare::{compare, Winner};
use billboard::config::Config;
use billboard::export::{comparison_rows, grouped_rows, ExportFormat};
use billboard::metrics::{AnalyticsFilter, Dimension, TimeRange};
use billboard::schedule::{evaluate, status_counts, time_remaining, ScheduleStatus};
use billboard::source::{AnalyticsSource, StoreAnalyticsSource};
use billboard::storage::{SqliteStorage, Storage};

#[derive(Parser)]
#[command(name = "billboard-admin")]
#[command(about = "Billboard banner administration CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List banners with their schedule status
    Status {
        /// Only banners of this placement
        #[arg(long)]
        placement: Option<String>,
    },
    /// Print hourly metrics
    Report {
        /// YYYY-MM-DD or RFC 3339
        #[arg(long)]
        start: Option<String>,
        /// YYYY-MM-DD (inclusive) or RFC 3339
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        banner: Option<i64>,
        #[arg(long)]
        placement: Option<String>,
        /// csv, tsv or html
        #[arg(long, default_value = "csv")]
        format: String,
    },
    /// Compare two banners by CTR
    Compare {
        banner_a: i64,
        banner_b: i64,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Enable a banner
    Activate { id: i64 },
    /// Disable a banner
    Deactivate { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let offset = config.reporting.offset()?;

    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
    );

    // Ensure database is initialized
    storage.init().await?;

    let source = StoreAnalyticsSource::new(
        Arc::clone(&storage),
        config.reporting.cost_model(),
        offset,
    );

    let range = |start: Option<String>, end: Option<String>| -> Result<TimeRange> {
        let start = start
            .map(|raw| parse_date(&raw, DateBound::Start, offset))
            .transpose()?;
        let end = end
            .map(|raw| parse_date(&raw, DateBound::End, offset))
            .transpose()?;
        Ok(TimeRange::new(start, end))
    };

    match cli.command {
        Commands::Status { placement } => {
            let banners = storage.list_banners(placement.as_deref()).await?;
            let now = Utc::now();

            if banners.is_empty() {
                println!("No banners found");
                return Ok(());
            }

            println!(
                "{:<6} {:<12} {:<10} {:<10} TITLE",
                "ID", "PLACEMENT", "STATUS", "COUNTDOWN"
            );
            for banner in &banners {
                let status = evaluate(banner, now);
                let target = match status {
                    ScheduleStatus::Scheduled => banner.start_at,
                    ScheduleStatus::Active => banner.end_at,
                    _ => None,
                };
                let countdown = target
                    .and_then(|t| time_remaining(t, now))
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<6} {:<12} {:<10} {:<10} {}",
                    banner.id,
                    banner.placement,
                    status.as_str(),
                    countdown,
                    banner.title
                );
            }

            let counts = status_counts(&banners, now);
            println!(
                "\n{} active, {} scheduled, {} expired, {} inactive",
                counts.active, counts.scheduled, counts.expired, counts.inactive
            );
        }
        Commands::Report {
            start,
            end,
            banner,
            placement,
            format,
        } => {
            let format = format.parse::<ExportFormat>().map_err(anyhow::Error::msg)?;
            let filter = AnalyticsFilter {
                range: range(start, end)?,
                unit_id: banner,
                placement,
            };
            let buckets = source
                .breakdown(&filter, Dimension::Hour)
                .await
                .context("failed to build hourly report")?;
            print!("{}", format.render(&grouped_rows(&buckets)));
        }
        Commands::Compare {
            banner_a,
            banner_b,
            start,
            end,
        } => {
            let range = range(start, end)?;
            let a = source
                .summary(&AnalyticsFilter::for_unit(banner_a, range))
                .await?;
            let b = source
                .summary(&AnalyticsFilter::for_unit(banner_b, range))
                .await?;
            let result = compare(&a, &b);
            print!("{}", ExportFormat::Tsv.render(&comparison_rows(&result)));
            println!(
                "\nWinner: {} ({:.1}% confidence)",
                match result.winner {
                    Winner::A => format!("banner {banner_a}"),
                    Winner::B => format!("banner {banner_b}"),
                    Winner::Tie => "tie".to_string(),
                },
                result.confidence
            );
        }
        Commands::Activate { id } => {
            if storage.set_active(id, true).await? {
                println!("✓ Activated banner {id}");
            } else {
                println!("⚠ Banner {id} not found");
            }
        }
        Commands::Deactivate { id } => {
            if storage.set_active(id, false).await? {
                println!("✓ Deactivated banner {id}");
            } else {
                println!("⚠ Banner {id} not found");
            }
        }
    }

    Ok(())
}
