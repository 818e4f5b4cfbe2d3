//! News Trade Bot
//!
//! Forwards news from several platforms to Telegram and trades Binance futures
//! from Telegram commands.

use clap::{Parser, Subcommand};
use news_trade_bot::{
    client::{http_client, BinanceClient, ExchangeApi},
    config::Config,
    executor::orders::DEFAULT_PRICE_PRECISION,
    ingester::{
        spawn_source, ChannelSource, DiscordSource, Routing, Source, ThreadsSource,
        TwitterSource,
    },
    notify::{NotificationQueue, Notifier},
    telegram::{format::caption, BotApi, CommandHandler, TelegramBot},
    types::{strip_tags, Message},
    utils::to_symbol,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "news-trade-bot")]
#[command(about = "News aggregation and futures trading Telegram bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sources and the command listener
    Run {
        /// Log collected news instead of posting it
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the configuration with secrets masked
    Config,
    /// Send a test message to the log chat
    TestNotify,
    /// Show 24h futures prices
    Prices {
        /// Coins, e.g. btc eth
        #[arg(required = true)]
        coins: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run { dry_run } => run_bot(config, dry_run).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            Ok(())
        }
        Commands::TestNotify => test_notify(config).await,
        Commands::Prices { coins } => show_prices(config, &coins).await,
    }
}

/// Client for the Bot API, through the Telegram proxy when configured
fn telegram_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    let proxy = config
        .proxy
        .telegram
        .as_ref()
        .map(|p| p.to_reqwest())
        .transpose()?;
    Ok(http_client(Duration::from_secs(60), proxy)?)
}

/// Client for scraped pages, through Tor when configured
fn scrape_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    let proxy = config.proxy.tor.as_ref().map(|p| p.to_reqwest()).transpose()?;
    Ok(http_client(Duration::from_secs(30), proxy)?)
}

async fn run_bot(config: Config, dry_run: bool) -> anyhow::Result<()> {
    tracing::info!("Starting news trade bot");

    let tg_http = telegram_client(&config)?;
    let api_url = &config.telegram.api_url;
    let news_api = Arc::new(BotApi::new(tg_http.clone(), api_url, &config.telegram.bot_token));
    let trading_api = Arc::new(BotApi::new(
        tg_http.clone(),
        api_url,
        config.telegram.trading_token(),
    ));

    let (queue, rx) = NotificationQueue::new(config.telegram.log_chat());
    let news_out = if dry_run {
        tracing::info!("Dry run, news is logged and not posted");
        Notifier::disabled()
    } else {
        Notifier::new(Arc::clone(&news_api), tg_http.clone())
    };
    let worker = tokio::spawn(NotificationQueue::run_worker(news_out, rx));

    let routing = Routing::from_config(&config)?;
    let api_http = http_client(Duration::from_secs(30), None)?;
    let scrape_http = scrape_client(&config)?;
    let threads = Arc::new(ThreadsSource::new(
        scrape_http.clone(),
        config.threads.clone(),
        routing,
    ));

    let mut sources: Vec<Arc<dyn Source>> = Vec::new();
    if config.twitter.enabled {
        sources.push(Arc::new(TwitterSource::new(
            api_http.clone(),
            config.twitter.clone(),
            routing,
        )));
    }
    if config.threads.enabled {
        sources.push(threads.clone());
    }
    if config.channels.enabled {
        sources.push(Arc::new(ChannelSource::new(
            scrape_http.clone(),
            config.channels.clone(),
            routing,
        )));
    }
    if config.discord.enabled {
        sources.push(Arc::new(DiscordSource::new(
            api_http.clone(),
            config.discord.clone(),
            routing,
        )));
    }
    if sources.is_empty() {
        tracing::warn!("No source enabled, only the command listener runs");
    }
    let source_tasks: Vec<_> = sources
        .into_iter()
        .map(|source| spawn_source(source, queue.clone()))
        .collect();

    let exchange: Arc<dyn ExchangeApi> = Arc::new(BinanceClient::new(&config.binance)?);
    let handler = Arc::new(CommandHandler::new(
        &config,
        exchange,
        threads,
        Notifier::new(Arc::clone(&trading_api), tg_http.clone()),
        news_api,
        queue.clone(),
        tg_http,
    )?);
    let bot = TelegramBot::new(trading_api, Arc::clone(&handler), &config);
    let mut bot_task = tokio::spawn(bot.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
        res = &mut bot_task => {
            tracing::error!("Command listener exited: {:?}", res);
        }
    }

    bot_task.abort();
    handler.jobs().shutdown();
    for task in source_tasks {
        task.abort();
    }
    drop(queue);
    drop(handler);
    // Remaining queued messages are flushed once the last sender is gone
    if tokio::time::timeout(Duration::from_secs(10), worker).await.is_err() {
        tracing::warn!("Notification worker did not drain in time");
    }
    Ok(())
}

async fn test_notify(config: Config) -> anyhow::Result<()> {
    let http = telegram_client(&config)?;
    let api = BotApi::new(http.clone(), &config.telegram.api_url, &config.telegram.bot_token);
    let notifier = Notifier::new(Arc::new(api), http);

    let msg = Message::new(
        config.telegram.log_chat(),
        "🧪 Test Notification",
        "If you see this, Telegram integration is working!",
    );
    notifier.deliver(&msg).await?;

    println!("✅ Test notification sent!");
    Ok(())
}

async fn show_prices(config: Config, coins: &[String]) -> anyhow::Result<()> {
    let client = BinanceClient::new(&config.binance)?;
    for coin in coins {
        let symbol = to_symbol(coin);
        let ticker = client.ticker_24h(&symbol).await?;
        let precision = client
            .symbol_info(&symbol)
            .await?
            .map(|info| info.price_precision)
            .unwrap_or(DEFAULT_PRICE_PRECISION);
        println!("{}", strip_tags(&caption(&ticker, precision)));
    }
    Ok(())
}
