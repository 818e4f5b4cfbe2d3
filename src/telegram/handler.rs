//! Command execution
//!
//! `execute` turns a parsed command into reply messages; the tracking commands
//! schedule jobs whose ticks post to the PnL, alert and group chats.

use super::api::{BotApi, TgMessage};
use super::command::BotCommand;
use super::format::{self, SpotRow, SEPARATOR};
use super::jobs::{JobControl, JobRegistry, JOB_ALERTS, JOB_REPLIES, JOB_STATS};
use crate::analysis::{resolve_window, KlineSummary};
use crate::client::types::MARGIN_EPSILON;
use crate::client::ExchangeApi;
use crate::config::{Config, TelegramConfig};
use crate::error::{BotError, Result};
use crate::executor::orders::DEFAULT_PRICE_PRECISION;
use crate::executor::{ExecutionReport, Executor};
use crate::ingester::threads::ThreadPost;
use crate::ingester::{post_body, ThreadsSource};
use crate::monitor::{AlertBook, ReplyTracker, TrackedThread};
use crate::notify::{NotificationQueue, Notifier};
use crate::types::{Message, TextFormat};
use crate::utils::{escape_html, format_timestamp, now_secs, to_coin, to_symbol, QUOTE_ASSET};
use chrono_tz::Tz;
use futures_util::future::try_join_all;
use reqwest::Client;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const DEFAULT_IP_URL: &str = "https://api.ipify.org";
const REPLIES_HINT: &str = "/freplies ";

pub struct CommandHandler {
    config: TelegramConfig,
    tz: Tz,
    threads_sla: i64,
    exchange: Arc<dyn ExchangeApi>,
    executor: Executor,
    threads: Arc<ThreadsSource>,
    /// Trading bot, used for job reports
    out: Notifier,
    /// Bot that publishes channel posts, the only one allowed to edit them
    news: Arc<BotApi>,
    queue: NotificationQueue,
    alerts: RwLock<AlertBook>,
    replies: RwLock<ReplyTracker>,
    jobs: JobRegistry,
    http: Client,
    ip_url: String,
}

impl CommandHandler {
    pub fn new(
        config: &Config,
        exchange: Arc<dyn ExchangeApi>,
        threads: Arc<ThreadsSource>,
        out: Notifier,
        news: Arc<BotApi>,
        queue: NotificationQueue,
        http: Client,
    ) -> Result<Self> {
        Ok(Self {
            config: config.telegram.clone(),
            tz: config.tz()?,
            threads_sla: config.threads.sla_secs,
            executor: Executor::new(Arc::clone(&exchange)),
            exchange,
            threads,
            out,
            news,
            queue,
            alerts: RwLock::new(AlertBook::new()),
            replies: RwLock::new(ReplyTracker::new()),
            jobs: JobRegistry::new(),
            http,
            ip_url: DEFAULT_IP_URL.to_string(),
        })
    }

    pub fn with_ip_url(mut self, url: impl Into<String>) -> Self {
        self.ip_url = url.into();
        self
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn queue(&self) -> &NotificationQueue {
        &self.queue
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Jobs keep a weak handle, so dropping the handler drops its registry and stops them
    fn schedule_tick<F, Fut>(self: &Arc<Self>, name: &str, every: Duration, tick: F)
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = JobControl> + Send + 'static,
    {
        let handler = Arc::downgrade(self);
        self.jobs.schedule(name, every, move || {
            let run = handler.upgrade().map(&tick);
            async move {
                match run {
                    Some(run) => run.await,
                    None => JobControl::Stop,
                }
            }
        });
    }

    pub async fn alerts(&self) -> AlertBook {
        self.alerts.read().await.clone()
    }

    pub async fn tracked_replies(&self) -> Vec<(i64, TrackedThread)> {
        self.replies.read().await.snapshot()
    }

    pub async fn public_ip(&self) -> Result<String> {
        let ip = self.http.get(&self.ip_url).send().await?.text().await?;
        Ok(ip.trim().to_string())
    }

    async fn price_precision(&self, symbol: &str) -> Result<u32> {
        Ok(self
            .exchange
            .symbol_info(symbol)
            .await?
            .map(|info| info.price_precision)
            .unwrap_or(DEFAULT_PRICE_PRECISION))
    }

    /// Entry point for every incoming message
    pub async fn handle_message(self: &Arc<Self>, msg: &TgMessage) {
        let Some(text) = msg.content() else {
            return;
        };

        if msg.chat.id == self.config.group_chat() && msg.is_automatic_forward {
            if let Err(e) = self.link_forwarded_post(msg).await {
                self.queue.report_error("Error linking forwarded post", &e);
            }
            return;
        }

        if !text.starts_with('/') {
            return;
        }
        let user = msg.from.as_ref().map(|u| u.id);
        if !self.config.is_admin(user) {
            tracing::warn!("Ignoring {} from non-admin {:?}", text, user);
            return;
        }

        let cmd = match BotCommand::parse(text) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => return,
            Err(e) => {
                self.reply_error(msg, &e).await;
                return;
            }
        };

        tracing::info!("Command: {}", text);
        match self.execute(cmd.clone(), msg.chat.id, msg.message_id).await {
            Ok(replies) => {
                for reply in replies {
                    if let Err(e) = self.out.deliver(&reply).await {
                        tracing::error!("Failed to reply to /{}: {}", cmd.name(), e);
                    }
                }
            }
            Err(e @ BotError::InvalidCommand(_)) => self.reply_error(msg, &e).await,
            Err(e) => self
                .queue
                .report_error(&format!("Error /{} - {}", cmd.name(), text), &e),
        }
    }

    async fn reply_error(&self, msg: &TgMessage, err: &BotError) {
        let reply = Message::new(msg.chat.id, "", format!("❌ {}", escape_html(&err.to_string())))
            .reply_to(msg.message_id);
        if let Err(e) = self.out.deliver(&reply).await {
            tracing::error!("Failed to send error reply: {}", e);
        }
    }

    /// Replies for the command chat, or messages for the configured chats
    pub async fn execute(
        self: &Arc<Self>,
        cmd: BotCommand,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Vec<Message>> {
        let reply = |body: String| vec![Message::new(chat_id, "", body).reply_to(message_id)];

        match cmd {
            BotCommand::Help => Ok(reply(format::help_text())),
            BotCommand::Start => {
                let ip = self.public_ip().await?;
                Ok(reply(format!(
                    "👋 Hello, your server public IP is <code>{}</code>\n\
                     Command <code>/fstats</code> interval(seconds) to schedule get stats for current positions",
                    escape_html(&ip)
                )))
            }
            BotCommand::Info => {
                let spot = self.spot_rows().await?;
                let account = self.exchange.futures_account().await?;
                let positions = self.exchange.positions().await?;
                Ok(reply(format!(
                    "{}\n{}\n{}",
                    format::spot_info(&spot),
                    SEPARATOR,
                    format::futures_info(&account, &positions)
                )))
            }
            BotCommand::Order {
                side,
                coin,
                leverage,
                margin,
                stop_loss,
                take_profit,
            } => {
                let symbol = to_symbol(&coin);
                let report = self
                    .executor
                    .market_order(side, &symbol, leverage, margin, stop_loss, take_profit)
                    .await?;
                self.execution_reply(
                    "forder",
                    &report,
                    &format!("Your order for {} is successful", symbol),
                )
                .map(|body| body.map(reply).unwrap_or_default())
            }
            BotCommand::Limit {
                side,
                coin,
                leverage,
                margin,
                price,
            } => {
                let symbol = to_symbol(&coin);
                let (order, ack) = self
                    .executor
                    .limit_order(side, &symbol, leverage, margin, price)
                    .await?;
                let body = format::orders_summary(
                    &format!(
                        "Your limit order for {} is successful (orderId {})",
                        symbol, ack.order_id
                    ),
                    std::slice::from_ref(&order),
                )?;
                Ok(reply(body))
            }
            BotCommand::Close { coin } => {
                let symbol = to_symbol(&coin);
                let report = self.executor.close_position(&symbol).await?;
                self.report_failures("fclose", &report.execution);

                let mut body = format!("👋 Cancelled all open orders for {}\n", symbol);
                if report.execution.orders.is_empty() {
                    body.push_str("No open position");
                } else {
                    for closed in &report.closed {
                        body.push_str(&format!(
                            "<code>{}</code> orderId {}, PNL: <b>${}</b>\n",
                            closed.order.describe(),
                            closed.order_id,
                            closed.pnl
                        ));
                    }
                    body.push_str(&format!("Total PNL: <b>${}</b>", report.total_pnl()));
                }
                Ok(reply(body))
            }
            BotCommand::TpSl {
                coin,
                stop_loss,
                take_profit,
            } => {
                let symbol = to_symbol(&coin);
                let report = self.executor.set_tp_sl(&symbol, stop_loss, take_profit).await?;
                if report.orders.is_empty() {
                    return Ok(reply(format!("👋 Not found position for {}!", symbol)));
                }
                self.execution_reply(
                    "ftpsl",
                    &report,
                    &format!("Your tp/sl order for {} is successful", symbol),
                )
                .map(|body| body.map(reply).unwrap_or_default())
            }
            BotCommand::Chart {
                coin,
                interval,
                range,
            } => {
                let symbol = to_symbol(&coin);
                let window = resolve_window(interval.as_deref(), range.as_deref());
                let (start, end) = window.bounds_ms(now_secs());
                let klines = self
                    .exchange
                    .klines(&symbol, &window.interval, start, end)
                    .await?;
                let summary = KlineSummary::from_klines(&symbol, &window.interval, &klines)
                    .ok_or_else(|| BotError::Api(format!("No klines for {}", symbol)))?;
                let ticker = self.exchange.ticker_24h(&symbol).await?;
                let precision = self.price_precision(&symbol).await?;
                Ok(reply(format!(
                    "{}\n\n{}",
                    summary.render(self.tz, precision),
                    format::caption(&ticker, precision)
                )))
            }
            BotCommand::Prices { coins } => {
                let captions = try_join_all(coins.iter().map(|coin| async move {
                    let symbol = to_symbol(coin);
                    let ticker = self.exchange.ticker_24h(&symbol).await?;
                    let precision = self.price_precision(&symbol).await?;
                    Ok::<_, BotError>(format::caption(&ticker, precision))
                }))
                .await?;
                Ok(reply(captions.join(&format!("{}\n", SEPARATOR))))
            }
            BotCommand::Stats { interval_secs } => {
                self.schedule_tick(JOB_STATS, Duration::from_secs(interval_secs), |this| async move {
                    this.stats_tick().await
                });
                Ok(reply(format!(
                    "Set stats successful!, interval={}s",
                    interval_secs
                )))
            }
            BotCommand::Alert { specs } => {
                let mut book = self.alerts.write().await;
                let mut staged = book.clone();
                let mut symbols = Vec::new();
                for spec in &specs {
                    symbols.push(staged.add(spec)?);
                }
                *book = staged;
                Ok(reply(format!(
                    "👋 Your set alert for <b>{}</b> successfully\n\
                     Command <code>/falert_track</code> interval(seconds) for tracking alert.",
                    symbols.join(", ")
                )))
            }
            BotCommand::AlertTrack { interval_secs } => {
                self.schedule_tick(JOB_ALERTS, Duration::from_secs(interval_secs), |this| async move {
                    this.alert_tick().await
                });
                Ok(reply(format!(
                    "Your alert is tracking, interval={}s",
                    interval_secs
                )))
            }
            BotCommand::AlertList => {
                let book = self.alerts.read().await;
                Ok(vec![Message::new(
                    self.config.alert_chat(),
                    "",
                    format::alert_list(&book),
                )])
            }
            BotCommand::AlertRemove { all, specs } => {
                let mut book = self.alerts.write().await;
                let removed = if all {
                    book.clear();
                    vec!["all symbol".to_string()]
                } else {
                    let mut staged = book.clone();
                    let mut symbols = Vec::new();
                    for spec in &specs {
                        symbols.push(staged.remove(spec)?);
                    }
                    *book = staged;
                    symbols
                };
                Ok(reply(format!(
                    "👋 Your removed alert for <b>{}</b> successfully\n\
                     Command <code>/falert_list</code> to see current alert.",
                    removed.join(", ")
                )))
            }
            BotCommand::Replies { url, message_id: group_id } => {
                self.replies
                    .write()
                    .await
                    .track(group_id, &url, now_secs() - self.threads_sla);
                Ok(reply(format!(
                    "👋 Your set track replies for <b>{}</b> to thread {} successfully\n\
                     Command <code>/freplies_track</code> interval(seconds) for tracking replies.",
                    escape_html(&url),
                    group_id
                )))
            }
            BotCommand::RepliesTrack { interval_secs } => {
                self.schedule_tick(JOB_REPLIES, Duration::from_secs(interval_secs), |this| async move {
                    this.replies_tick().await
                });
                Ok(reply(format!(
                    "Your replies is tracking, interval={}s",
                    interval_secs
                )))
            }
            BotCommand::RepliesList => {
                let threads = self.replies.read().await.snapshot();
                Ok(vec![Message::new(
                    self.config.log_chat(),
                    "",
                    format::replies_list(&threads, self.tz),
                )])
            }
            BotCommand::RepliesRemove { all, message_ids } => {
                let mut tracker = self.replies.write().await;
                let removed = if all {
                    tracker.clear();
                    "all message_id".to_string()
                } else {
                    let ids = tracker.remove(&message_ids);
                    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
                };
                Ok(vec![Message::new(
                    self.config.log_chat(),
                    "",
                    format!(
                        "👋 Your removed replies for <b>{}</b> successfully\n\
                         Command <code>/freplies_list</code> to see current replies.",
                        removed
                    ),
                )])
            }
        }
    }

    /// Non-zero spot balances valued in the quote asset
    async fn spot_rows(&self) -> Result<Vec<SpotRow>> {
        let mut rows = Vec::new();
        for balance in self.exchange.spot_balances().await? {
            let qty = balance.total();
            if qty <= MARGIN_EPSILON {
                continue;
            }
            let price = if balance.asset == QUOTE_ASSET {
                Decimal::ONE
            } else {
                self.exchange
                    .spot_price(&format!("{}{}", balance.asset, QUOTE_ASSET))
                    .await?
            };
            rows.push(SpotRow {
                asset: balance.asset,
                qty,
                price,
            });
        }
        Ok(rows)
    }

    fn report_failures(&self, command: &str, report: &ExecutionReport) {
        for failure in &report.failures {
            self.queue.report_error(
                &format!("Error /{} - {}", command, failure.order.describe()),
                &format!("{} {}", failure.code, failure.msg),
            );
        }
    }

    /// Success summary, or `None` after reporting the refused orders
    fn execution_reply(
        &self,
        command: &str,
        report: &ExecutionReport,
        title: &str,
    ) -> Result<Option<String>> {
        if !report.is_ok() {
            self.report_failures(command, report);
            return Ok(None);
        }
        format::orders_summary(title, &report.orders).map(Some)
    }

    /// Deliver through the trading bot, logging failures
    pub async fn post_to_chat(&self, msg: Message) {
        if let Err(e) = self.out.deliver(&msg).await {
            tracing::error!("Failed to post job report to {}: {}", msg.chat_id, e);
        }
    }

    /// PnL report, `None` without open positions
    pub async fn stats_report(&self) -> Result<Option<Message>> {
        let positions = self.exchange.positions().await?;
        if positions.is_empty() {
            return Ok(None);
        }
        let account = self.exchange.futures_account().await?;

        let mut body = String::new();
        if account.roi().abs() >= self.config.roi_signal {
            body.push_str(&format!(
                "{} - <b>${}</b>\n",
                escape_html(&self.config.mention),
                account.total_unrealized_profit.round_dp(2)
            ));
        }
        body.push_str(&format!(
            "<b>{}</b> - {}",
            format_timestamp(now_secs(), self.tz),
            format::futures_info(&account, &positions)
        ));
        Ok(Some(Message::new(self.config.pnl_chat(), "", body)))
    }

    pub async fn stats_tick(&self) -> JobControl {
        match self.stats_report().await {
            Ok(Some(msg)) => {
                self.post_to_chat(msg).await;
                JobControl::Continue
            }
            Ok(None) => {
                self.post_to_chat(Message::new(
                    self.config.pnl_chat(),
                    "",
                    "👋 You don't have positions at this time!\n\
                     Job was removed, please command <code>/fstats</code> interval(seconds) when create a new position/order.",
                ))
                .await;
                JobControl::Stop
            }
            Err(e) => {
                self.queue.report_error("Error /fstats", &e);
                JobControl::Continue
            }
        }
    }

    /// Take the alerts reached at the last price, `None` when nothing triggered
    pub async fn check_alerts(&self) -> Result<Option<Message>> {
        let symbols = self.alerts.read().await.symbols();
        let mut tickers = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            tickers.push(self.exchange.ticker_24h(symbol).await?);
        }

        let mut hits = Vec::new();
        {
            let mut book = self.alerts.write().await;
            for ticker in tickers {
                let triggered = book.take_triggered(&ticker.symbol, ticker.last_price);
                if !triggered.is_empty() {
                    hits.push((ticker, triggered));
                }
            }
        }
        if hits.is_empty() {
            return Ok(None);
        }

        let mut sections = Vec::new();
        for (ticker, triggered) in &hits {
            let mut section = String::new();
            for alert in triggered {
                section.push_str(&format!(
                    "🔔 Alert <b>{}</b>, setup: <b>{}</b>, chart: <code>/fch {}</code>\n",
                    ticker.symbol,
                    escape_html(&alert.to_string()),
                    to_coin(&ticker.symbol)
                ));
            }
            let precision = self.price_precision(&ticker.symbol).await?;
            section.push('\n');
            section.push_str(&format::caption(ticker, precision));
            sections.push(section);
        }

        let listed: Vec<&str> = hits.iter().map(|(t, _)| t.symbol.as_str()).collect();
        let body = format!(
            "🔔 Price alert {}, list: <b>{}</b>\n\n{}",
            escape_html(&self.config.mention),
            listed.join(", "),
            sections.join(&format!("{}\n", SEPARATOR))
        );
        Ok(Some(Message::new(self.config.alert_chat(), "", body)))
    }

    pub async fn alert_tick(&self) -> JobControl {
        if self.alerts.read().await.is_empty() {
            self.post_to_chat(Message::new(
                self.config.alert_chat(),
                "",
                "👋 You don't have any alert for tracking at this time!\n\
                 Job was removed, please command <code>/falert_track</code> interval(seconds) when create a new alert.",
            ))
            .await;
            return JobControl::Stop;
        }
        match self.check_alerts().await {
            Ok(Some(msg)) => self.post_to_chat(msg).await,
            Ok(None) => {}
            Err(e) => self.queue.report_error("Error /falert_track", &e),
        }
        JobControl::Continue
    }

    /// Replies newer than the thread mark, oldest first, as replies to `group_id`
    pub async fn collect_replies(&self, group_id: i64, thread: &TrackedThread) -> Result<Vec<Message>> {
        let posts = self.threads.scrape_thread(&thread.url).await?;
        let Some((root, replies)) = posts.split_first() else {
            return Ok(Vec::new());
        };

        let mut fresh: Vec<&ThreadPost> = replies
            .iter()
            .filter(|r| r.taken_at > thread.max_timestamp)
            .collect();
        fresh.sort_by_key(|r| r.taken_at);
        if let Some(newest) = fresh.last() {
            self.replies.write().await.advance(group_id, newest.taken_at);
        }

        Ok(fresh
            .into_iter()
            .map(|r| {
                let mut title = format!("{} - Time: {}", r.username, format_timestamp(r.taken_at, self.tz));
                if r.username == root.username && !self.config.mention.is_empty() {
                    title.push_str(&format!(" - {}", self.config.mention));
                }
                let msg = Message::new(self.config.group_chat(), title, post_body(&r.text, &r.url))
                    .reply_to(group_id);
                match &r.image {
                    Some(image) => msg.with_image(image.clone()),
                    None => msg,
                }
            })
            .collect())
    }

    pub async fn replies_tick(&self) -> JobControl {
        let threads = self.replies.read().await.snapshot();
        if threads.is_empty() {
            self.post_to_chat(Message::new(
                self.config.log_chat(),
                "",
                "👋 You don't have any replies for tracking at this time!\n\
                 Job was removed, please command <code>/freplies_track</code> interval(seconds) when create a new reply.",
            ))
            .await;
            return JobControl::Stop;
        }
        for (group_id, thread) in threads {
            match self.collect_replies(group_id, &thread).await {
                Ok(messages) => messages.into_iter().for_each(|m| self.queue.send(m)),
                Err(e) => self
                    .queue
                    .report_error(&format!("Error /freplies_track - {}", thread.url), &e),
            }
        }
        JobControl::Continue
    }

    /// Append the group message id to the `/freplies` hint of the channel post
    /// this automatic forward came from. Returns whether the post was edited.
    pub async fn link_forwarded_post(&self, msg: &TgMessage) -> Result<bool> {
        let Some(origin) = &msg.forward_origin else {
            return Ok(false);
        };
        let (Some(chat), Some(origin_id)) = (&origin.chat, origin.message_id) else {
            return Ok(false);
        };
        let Some(edited) = msg.content().and_then(|c| append_group_id(c, msg.message_id)) else {
            return Ok(false);
        };

        if msg.caption.is_some() {
            self.news
                .edit_message_caption(chat.id, origin_id, &edited, TextFormat::Html)
                .await?;
        } else {
            self.news
                .edit_message_text(chat.id, origin_id, &edited, TextFormat::Html)
                .await?;
        }
        tracing::info!("Linked channel post {} to group message {}", origin_id, msg.message_id);
        Ok(true)
    }
}

/// `... /freplies URL` -> `... <code>/freplies URL GROUP_ID</code>`; `None`
/// without a hint or when the hint already carries an id
pub fn append_group_id(content: &str, group_id: i64) -> Option<String> {
    let idx = content.rfind(REPLIES_HINT)?;
    let (before, hint) = content.split_at(idx);
    let hint = hint.trim_end();
    if hint.split_whitespace().count() != 2 {
        return None;
    }
    Some(format!(
        "{}<code>{} {}</code>",
        escape_html(before),
        escape_html(hint),
        group_id
    ))
}
