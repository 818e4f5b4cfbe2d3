//! Source ingestion
//!
//! Each platform implements [`Source`]; [`spawn_source`] polls it on a fixed
//! interval and pushes the resulting messages into the notification queue.
//!
//! ```text
//! Twitter ─┐
//! Threads ─┤
//! Channels ┼─→ poll() → Vec<Message> → NotificationQueue → Bot API
//! Discord ─┘
//! ```

pub mod discord;
pub mod telegram;
pub mod threads;
pub mod twitter;

pub use discord::DiscordSource;
pub use telegram::ChannelSource;
pub use threads::ThreadsSource;
pub use twitter::TwitterSource;

use crate::config::Config;
use crate::error::Result;
use crate::notify::NotificationQueue;
use crate::types::Message;
use crate::utils::{escape_html, format_timestamp, html_link, is_trade_call};
use async_trait::async_trait;
use chrono_tz::Tz;
use rand::Rng;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A platform polled on a fixed interval
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    /// Runs once before the first poll; an error disables the source
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// New messages since the previous poll
    async fn poll(&self) -> Result<Vec<Message>>;
}

/// Poll `source` forever: first run immediately, missed ticks skipped
pub fn spawn_source(source: Arc<dyn Source>, queue: NotificationQueue) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = source.name().to_string();
        if let Err(e) = source.init().await {
            queue.report_error(&format!("Error {} init, source disabled", name), &e);
            return;
        }

        tracing::info!("{} source started, polling every {:?}", name, source.interval());
        let mut ticker = tokio::time::interval(source.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match source.poll().await {
                Ok(messages) => {
                    if !messages.is_empty() {
                        tracing::info!("{}: {} new posts", name, messages.len());
                    }
                    for msg in messages {
                        queue.send(msg);
                    }
                }
                Err(e) => queue.report_error(&format!("Error {} poll", name), &e),
            }
        }
    })
}

/// Where source posts and source errors go
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Routing {
    pub news_chat: i64,
    pub trade_chat: i64,
    pub log_chat: i64,
    pub tz: Tz,
}

impl Routing {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            news_chat: config.telegram.news_chat_id,
            trade_chat: config.telegram.trade_chat(),
            log_chat: config.telegram.log_chat(),
            tz: config.tz()?,
        })
    }

    /// Trade calls go to the trade chat, everything else to the news chat
    pub fn chat_for(&self, text: &str) -> i64 {
        if is_trade_call(text) {
            self.trade_chat
        } else {
            self.news_chat
        }
    }

    /// `{label} - Time: {local time}`
    pub fn title(&self, label: &str, ts: i64) -> String {
        format!("{} - Time: {}", label, format_timestamp(ts, self.tz))
    }

    /// Per-target failure that should not abort the whole poll
    pub fn error(&self, title: &str, err: &dyn Display) -> Message {
        tracing::error!("{}: {}", title, err);
        Message::new(self.log_chat, title, format!("Error: {}", err)).plain()
    }
}

/// Escaped post text followed by its link
pub fn post_body(text: &str, url: &str) -> String {
    format!("{}\n\nLink: {}", escape_html(text), html_link(url, url))
}

/// Last-seen timestamp (or id) per key; never moves backwards
#[derive(Debug, Clone)]
pub struct HighWaterMark<K> {
    marks: HashMap<K, i64>,
}

impl<K: Eq + Hash> Default for HighWaterMark<K> {
    fn default() -> Self {
        Self {
            marks: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> HighWaterMark<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<i64> {
        self.marks.get(key).copied()
    }

    /// True when `ts` is past the mark, or no mark exists yet
    pub fn is_new(&self, key: &K, ts: i64) -> bool {
        self.marks.get(key).map_or(true, |mark| ts > *mark)
    }

    pub fn advance(&mut self, key: K, ts: i64) {
        let mark = self.marks.entry(key).or_insert(ts);
        *mark = (*mark).max(ts);
    }

    /// Set the initial mark when none exists
    pub fn seed(&mut self, key: K, ts: i64) -> i64 {
        *self.marks.entry(key).or_insert(ts)
    }
}

/// Age of `ts` at `now` is within `sla` seconds
pub fn within_sla(now: i64, ts: i64, sla: i64) -> bool {
    now - ts <= sla
}

/// Inclusive range of seconds to wait between requests to the same platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pause {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Pause {
    pub const fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    pub async fn wait(&self) {
        if self.max_secs == 0 {
            return;
        }
        let secs = rand::rng().random_range(self.min_secs..=self.max_secs.max(self.min_secs));
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }
}

#[cfg(test)]
mod tests;
