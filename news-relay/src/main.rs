use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use news_relay::{
    Article, ChatSummarizer, DeliveryUnit, DiscoveryParams, NewsRelay, PgStore, RelayConfig,
    TelegramNotifier,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Relays newly published articles to a notification channel", long_about = None)]
struct Cli {
    /// PostgreSQL connection string. Without it, state lives in memory.
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Log notifications instead of sending them.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run discovery once and wait for the deliveries it triggers
    Discover {
        #[arg(long)]
        listing_url: Option<String>,
        #[arg(long)]
        feed_url: Option<String>,
        /// Return as soon as deliveries are dispatched
        #[arg(long)]
        no_wait: bool,
    },
    /// Deliver a single article
    Deliver {
        #[arg(long)]
        url: String,
        #[arg(long)]
        title: String,
        /// Text to summarize. Defaults to the title.
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        image_url: Option<String>,
        /// Deliver even if the article was already delivered
        #[arg(long)]
        reprocess: bool,
    },
    /// Run discovery on a schedule until interrupted
    Run {
        #[arg(long, env = "RELAY_SCHEDULE_MINUTES")]
        interval_minutes: Option<u64>,
    },
    /// Create the PostgreSQL tables
    InitDb,
    /// Purge expired cache entries and abandoned journal steps
    Maintain,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = RelayConfig::from_env().context("invalid configuration")?;
    if cli.database_url.is_some() {
        config.database_url = cli.database_url.clone();
    }

    match cli.command {
        Command::InitDb => {
            let Some(database_url) = config.database_url.as_deref() else {
                bail!("init-db needs DATABASE_URL or --database-url");
            };
            let store = PgStore::new(database_url).await.context("failed to connect to PostgreSQL")?;
            store.setup_schema().await.context("failed to create tables")?;
            info!("Database schema ready");
        }
        Command::Discover {
            listing_url,
            feed_url,
            no_wait,
        } => {
            let relay = build_relay(&config, cli.dry_run).await?;
            let result = relay
                .discover_now(DiscoveryParams { listing_url, feed_url })
                .await
                .context("discovery failed")?;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if !no_wait {
                let failed = relay.wait_for_deliveries(&result).await?;
                if failed > 0 {
                    warn!("{} of {} deliveries failed", failed, result.triggered.len());
                }
            }
        }
        Command::Deliver {
            url,
            title,
            content,
            image_url,
            reprocess,
        } => {
            let relay = build_relay(&config, cli.dry_run).await?;
            let article = Article {
                content: content.unwrap_or_else(|| title.clone()),
                title,
                url,
                date_published: Utc::now(),
                image_url,
            };
            let result = relay
                .deliver_now(DeliveryUnit { article, reprocess })
                .await
                .context("delivery failed")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Maintain => {
            let relay = build_relay(&config, cli.dry_run).await?;
            relay.maintain().await.context("maintenance failed")?;
            info!("Maintenance pass complete");
        }
        Command::Run { interval_minutes } => {
            let interval = interval_minutes
                .map(|minutes| Duration::from_secs(minutes.max(1) * 60))
                .unwrap_or(config.schedule_interval);

            let relay = build_relay(&config, cli.dry_run).await?;
            relay
                .run_periodic(interval, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for shutdown signal: {}", e);
                    }
                })
                .await;
        }
    }

    Ok(())
}

async fn build_relay(config: &RelayConfig, dry_run: bool) -> anyhow::Result<NewsRelay> {
    let mut builder = NewsRelay::builder(config.clone());

    match config.database_url.as_deref() {
        Some(database_url) => {
            let store = Arc::new(PgStore::new(database_url).await.context("failed to connect to PostgreSQL")?);
            info!("Using PostgreSQL for cache and step journal");
            builder = builder.cache(store.clone()).journal(store);
        }
        None => warn!("DATABASE_URL not set, delivery state is kept in memory only"),
    }

    if let Some(llm) = config.llm.clone() {
        builder = builder.summarizer(Arc::new(ChatSummarizer::new(llm)?));
    }

    match config.telegram.clone() {
        Some(telegram) if !dry_run => {
            builder = builder.notifier(Arc::new(TelegramNotifier::new(telegram)?));
        }
        _ => info!("Notifications are logged, not sent"),
    }

    Ok(builder.build()?)
}
