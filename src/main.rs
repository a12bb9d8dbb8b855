use anyhow::Result;
use clap::{Parser, Subcommand};
use proxy_harvest::{Pipeline, Settings, Store};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

/// A proxy harvester: crawls public sources, validates endpoints and
/// keeps a scored catalog
#[derive(Parser)]
#[command(name = "proxy-harvest")]
#[command(about = "Harvest, validate and score proxy endpoints")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL (e.g. sqlite://proxies.db)
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one collection cycle
    Run {
        /// Reduced-breadth smoke-test cycle (few repos, one page)
        #[arg(long)]
        fast: bool,
    },
    /// Run continuously on a fixed interval
    Daemon {
        /// Minutes between cycles (overrides SCHEDULE_MINUTES)
        #[arg(long)]
        interval_minutes: Option<u64>,
    },
    /// Print dashboard statistics as JSON
    Stats,
    /// List the best alive proxies
    Top {
        /// Maximum number of proxies to list
        #[arg(short, long, default_value = "20")]
        limit: i64,
        /// Restrict to countries (ISO alpha-2, repeatable)
        #[arg(short, long)]
        country: Vec<String>,
    },
    /// Queue a repository for deep scanning
    Enqueue {
        /// Repository as owner/name
        repo: String,
        /// Optional note stored with the task
        #[arg(short, long)]
        note: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(database) = cli.database {
        settings.database_url = database;
    }

    match cli.command {
        Commands::Run { fast } => {
            let pipeline = Pipeline::new(settings).await?;
            let stats = pipeline.run_once(fast).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Daemon { interval_minutes } => {
            let minutes = interval_minutes.unwrap_or(settings.schedule_minutes).max(1);
            let pipeline = Pipeline::new(settings).await?;

            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(minutes * 60));
            // Runs stay serialized: the next tick waits out a long cycle.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(minutes, "daemon started");
            loop {
                interval.tick().await;
                match pipeline.run_once(false).await {
                    Ok(stats) => tracing::info!(?stats, "daemon cycle finished"),
                    Err(err) => tracing::error!(error = %err, "daemon cycle failed"),
                }
            }
        }
        Commands::Stats => {
            let store = Store::connect(&settings.database_url).await?;
            let stats = store.dashboard_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Top { limit, country } => {
            let store = Store::connect(&settings.database_url).await?;
            let countries: Vec<String> =
                country.into_iter().map(|c| c.to_uppercase()).collect();
            let filter = if countries.is_empty() {
                None
            } else {
                Some(countries.as_slice())
            };
            let rows = store.top_alive(limit, filter).await?;

            if rows.is_empty() {
                println!("No alive proxies found.");
            } else {
                for (idx, row) in rows.iter().enumerate() {
                    println!(
                        "{:>3}. {}://{}:{} [{}] score={:.1} latency={}",
                        idx + 1,
                        row.proxy_type,
                        row.host,
                        row.port,
                        row.country.as_deref().unwrap_or("??"),
                        row.score,
                        row.latency_ms
                            .map_or("n/a".to_string(), |ms| format!("{ms:.0}ms")),
                    );
                }
            }
        }
        Commands::Enqueue { repo, note } => {
            let store = Store::connect(&settings.database_url).await?;
            let outcome = store.enqueue_repo(&repo, note.as_deref()).await?;
            if outcome.created() {
                println!("Queued {repo} for deep scanning.");
            } else {
                println!("Skipped {repo}: {}.", outcome.reason());
            }
        }
    }

    Ok(())
}
