//! stockwatch - 商品ページを監視し、在庫が戻ったら Telegram で知らせる bot
//!
//! 起動時に store の全監視を restore してから update loop に入り、
//! Ctrl-C で全 watch task を止めて終了します。

mod bot;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use stockwatch_core::app::{CommandHandler, SchedulerConfig, TrackingScheduler};
use stockwatch_core::impls::{
    HttpFetcherConfig, HttpStatusFetcher, SqliteWatchStore, TelegramClient, TelegramNotifier,
};

use crate::bot::UpdateLoop;

/// Telegram stock watcher.
#[derive(Parser, Debug)]
#[command(name = "stockwatch", version, about)]
struct Cli {
    /// Telegram bot token.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    /// SQLite database holding the tracked links.
    #[arg(long, env = "STOCKWATCH_DB", default_value = "tracked_links.db")]
    db_path: PathBuf,

    /// Seconds between two checks of the same product.
    #[arg(
        long,
        env = "STOCKWATCH_POLL_INTERVAL",
        default_value_t = 3,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_interval_secs: u64,

    /// Timeout for a single product page request, in seconds.
    #[arg(
        long,
        env = "STOCKWATCH_FETCH_TIMEOUT",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    fetch_timeout_secs: u64,

    /// getUpdates long-poll timeout, in seconds.
    #[arg(long, default_value_t = 30)]
    long_poll_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let store = SqliteWatchStore::open(&cli.db_path)
        .with_context(|| format!("opening database {}", cli.db_path.display()))?;
    let fetcher = HttpStatusFetcher::new(
        HttpFetcherConfig::default().with_timeout(Duration::from_secs(cli.fetch_timeout_secs)),
    )
    .context("building HTTP client")?;
    let client = TelegramClient::new(cli.bot_token).context("configuring Telegram client")?;

    let scheduler = Arc::new(TrackingScheduler::new(
        Arc::new(store),
        Arc::new(fetcher),
        Arc::new(TelegramNotifier::new(client.clone())),
        SchedulerConfig::default().with_poll_interval(Duration::from_secs(cli.poll_interval_secs)),
    ));

    let restored = scheduler
        .restore()
        .await
        .context("restoring tracked links")?;
    info!(restored, db = %cli.db_path.display(), "stockwatch started");

    let handler = Arc::new(CommandHandler::new(Arc::clone(&scheduler)));
    let updates = UpdateLoop::new(client, handler, Duration::from_secs(cli.long_poll_secs));

    tokio::select! {
        _ = updates.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            info!("Ctrl-C received, stopping");
        }
    }

    scheduler.shutdown().await;
    info!("stockwatch stopped");
    Ok(())
}
