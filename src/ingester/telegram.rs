//! Public Telegram channels
//!
//! Reads the `t.me/s/{channel}` web preview, which lists the latest posts of a
//! public channel without a user session. New posts are forwarded; the text
//! version is the fallback when the bot cannot forward.

use super::{post_body, HighWaterMark, Routing, Source};
use crate::config::ChannelsConfig;
use crate::error::{BotError, Result};
use crate::types::Message;
use crate::utils::now_secs;
use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPost {
    pub id: i64,
    pub text: String,
    pub date: i64,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| BotError::Scrape(format!("selector {}: {}", css, e)))
}

/// Text with `<br>` kept as newlines
fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Posts of the preview page in page order (oldest first)
pub fn parse_preview(html: &str) -> Result<Vec<ChannelPost>> {
    let message_sel = selector("div.tgme_widget_message[data-post]")?;
    let text_sel = selector(".tgme_widget_message_text")?;
    let time_sel = selector("time[datetime]")?;
    let document = Html::parse_document(html);

    let posts = document
        .select(&message_sel)
        .filter_map(|el| {
            let data_post = el.value().attr("data-post")?;
            let id = data_post.rsplit('/').next()?.parse().ok()?;
            let date = el
                .select(&time_sel)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())?
                .timestamp();
            let text = el
                .select(&text_sel)
                .next()
                .map(element_text)
                .unwrap_or_default();
            Some(ChannelPost { id, text, date })
        })
        .collect();
    Ok(posts)
}

pub struct ChannelSource {
    http: Client,
    config: ChannelsConfig,
    routing: Routing,
    /// Keyed by channel name, post dates
    marks: Mutex<HighWaterMark<String>>,
}

impl ChannelSource {
    pub fn new(http: Client, config: ChannelsConfig, routing: Routing) -> Self {
        Self {
            http,
            config,
            routing,
            marks: Mutex::new(HighWaterMark::new()),
        }
    }

    pub async fn fetch(&self, channel: &str) -> Result<Vec<ChannelPost>> {
        let url = format!("{}/{}", self.config.preview_url, channel);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BotError::Scrape(format!("{} returned HTTP {}", url, status)));
        }
        let html = resp.text().await?;
        parse_preview(&html)
    }

    /// Posts past the channel mark (first seen: now minus SLA), at most `limit`
    /// newest, oldest first
    pub fn filter(&self, channel: &str, posts: Vec<ChannelPost>, now: i64) -> Vec<Message> {
        let mut marks = self.marks.lock();
        let mark = marks.seed(channel.to_string(), now - self.config.sla_secs);

        let mut fresh: Vec<ChannelPost> = posts.into_iter().filter(|p| p.date > mark).collect();
        fresh.sort_by_key(|p| (p.date, p.id));
        if fresh.len() > self.config.limit {
            fresh.drain(..fresh.len() - self.config.limit);
        }
        if let Some(newest) = fresh.last() {
            marks.advance(channel.to_string(), newest.date);
        }

        fresh
            .into_iter()
            .map(|post| self.to_message(channel, &post))
            .collect()
    }

    fn to_message(&self, channel: &str, post: &ChannelPost) -> Message {
        let url = format!("https://t.me/{}/{}", channel, post.id);
        Message::new(
            self.routing.chat_for(&post.text),
            self.routing.title(&format!("Telegram - @{}", channel), post.date),
            post_body(&post.text, &url),
        )
        .forward_of(format!("@{}", channel), post.id)
    }
}

#[async_trait]
impl Source for ChannelSource {
    fn name(&self) -> &str {
        "Telegram channels"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_secs)
    }

    async fn poll(&self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        for raw in &self.config.channels {
            let channel = raw.trim().trim_start_matches('@');
            match self.fetch(channel).await {
                Ok(posts) => messages.extend(self.filter(channel, posts, now_secs())),
                Err(e) => messages.push(
                    self.routing
                        .error(&format!("Error Telegram channel - @{}", channel), &e),
                ),
            }
        }
        Ok(messages)
    }
}
