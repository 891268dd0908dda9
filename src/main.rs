use engulf_signals::{
    config::Config,
    deduplication::{Deduplicator, JsonFileStore},
    feed::{BitunixClient, RetryPolicy},
    notifier::{diagnostic_message, send_best_effort, startup_message, LogNotifier, Notifier, TelegramNotifier},
    patterns::PatternDetector,
    scanner::{MarketScanner, ScannerConfig},
    scheduler, server,
    universe::UniverseSelector,
};
use chrono::Utc;
use std::{env, sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("engulf_signals=info")),
        )
        .init();

    info!("==================================================");
    info!("  EMA ENGULFING MONITOR");
    info!("==================================================");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            report_startup_failure(&e).await;
            return Err(e.into());
        }
    };

    info!("Exchange: {}", config.base_url);
    info!("Timeframes: {:?}, cycle minutes {:?}", config.timeframes, config.cycle.minutes());

    let feed = BitunixClient::new(
        &config.base_url,
        &config.kline_path,
        &config.tickers_path,
        config.http_timeout,
        config.retry,
    )?;

    let notifier: Arc<dyn Notifier> = match &config.telegram {
        Some(tg) => Arc::new(TelegramNotifier::new(
            &tg.api_url,
            &tg.token,
            &tg.chat_id,
            config.http_timeout,
            config.retry,
        )?),
        None => {
            warn!("TELEGRAM_BOT_TOKEN not set, alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let deduplicator = Deduplicator::new(Box::new(JsonFileStore::new(&config.state_file)), config.retention);
    if let Err(e) = deduplicator.load().await {
        warn!("Starting with an empty dedup store: {}", e);
        send_best_effort(notifier.as_ref(), &diagnostic_message("Dedup snapshot unreadable, starting empty", &e)).await;
    }
    deduplicator.sweep(Utc::now()).await;

    let scanner = Arc::new(MarketScanner::new(
        Arc::new(feed),
        Arc::clone(&notifier),
        deduplicator,
        UniverseSelector::new(config.universe.clone()),
        PatternDetector::new(config.detector),
        ScannerConfig {
            timeframes: config.timeframes.clone(),
            candle_limit: config.candle_limit,
            min_bars: config.min_bars,
            display_offset: config.reset.offset,
        },
    ));

    send_best_effort(
        notifier.as_ref(),
        &startup_message(&config.universe.watchlist, &config.timeframes),
    )
    .await;

    let scanner_clone = Arc::clone(&scanner);
    let (cron, reset) = (config.cycle.clone(), config.reset);
    let scheduler_task = tokio::spawn(async move {
        scheduler::run(scanner_clone, cron, reset, true).await;
    });

    // health must not outlive the scheduler
    tokio::select! {
        served = server::serve(config.port, scanner) => served?,
        ended = scheduler_task => {
            error!("Scheduler stopped, shutting down: {:?}", ended);
            return Err("scheduler stopped".into());
        }
    }
    Ok(())
}

/// One diagnostic alert when configuration is unusable but a bot is reachable.
async fn report_startup_failure(err: &engulf_signals::Error) {
    let (Ok(token), Ok(chat_id)) = (env::var("TELEGRAM_BOT_TOKEN"), env::var("TELEGRAM_CHAT_ID")) else {
        return;
    };
    let api_url = env::var("TELEGRAM_API_URL").unwrap_or("https://api.telegram.org".into());
    let retry = RetryPolicy { attempts: 1, backoff: Duration::ZERO };
    if let Ok(notifier) = TelegramNotifier::new(&api_url, &token, &chat_id, Duration::from_secs(8), retry) {
        send_best_effort(&notifier, &diagnostic_message("Monitor failed to start", err)).await;
    }
}
