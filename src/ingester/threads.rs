//! Threads profiles
//!
//! Profile and post pages embed their data as server-rendered JSON in
//! `<script type="application/json" data-sjs>` tags. Posts are taken from every
//! `thread_items` array found in those blobs.

use super::{post_body, within_sla, HighWaterMark, Routing, Source};
use crate::config::ThreadsConfig;
use crate::error::{BotError, Result};
use crate::types::Message;
use crate::utils::{escape_html, is_trade_call, now_secs};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

const DATA_SCRIPT: &str = r#"script[type="application/json"][data-sjs]"#;

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadPost {
    pub text: String,
    pub taken_at: i64,
    pub code: String,
    pub username: String,
    pub image: Option<String>,
    pub url: String,
}

impl ThreadPost {
    /// Parse one `thread_items` entry
    pub fn from_item(item: &Value, base_url: &str) -> Option<Self> {
        let post = item.get("post")?;
        let code = post.get("code")?.as_str()?.to_string();
        let username = post.pointer("/user/username")?.as_str()?.to_string();
        Some(Self {
            text: post
                .pointer("/caption/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            taken_at: post.get("taken_at")?.as_i64()?,
            url: format!("{}/@{}/post/{}", base_url, username, code),
            image: post
                .pointer("/image_versions2/candidates/0/url")
                .and_then(Value::as_str)
                .map(str::to_string),
            code,
            username,
        })
    }

    /// Post link that lists replies newest first
    pub fn recent_url(&self) -> String {
        format!("{}?sort_order=recent", self.url)
    }
}

/// Posts found in the page, in page order, without duplicates
pub fn parse_page(html: &str, base_url: &str) -> Result<Vec<ThreadPost>> {
    let selector =
        Selector::parse(DATA_SCRIPT).map_err(|e| BotError::Scrape(format!("selector: {}", e)))?;
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut posts = Vec::new();
    for script in document.select(&selector) {
        let raw: String = script.text().collect();
        if !raw.contains("\"ScheduledServerJS\"") || !raw.contains("thread_items") {
            continue;
        }
        let data: Value = match serde_json::from_str(&raw) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!("Skipping unparsable Threads blob: {}", e);
                continue;
            }
        };

        let mut items = Vec::new();
        collect_thread_items(&data, &mut items);
        for post in items.iter().filter_map(|i| ThreadPost::from_item(i, base_url)) {
            if seen.insert(post.code.clone()) {
                posts.push(post);
            }
        }
    }
    Ok(posts)
}

/// Every element of every `thread_items` array, depth first
pub fn collect_thread_items<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match (key.as_str(), child) {
                    ("thread_items", Value::Array(items)) => out.extend(items.iter()),
                    _ => collect_thread_items(child, out),
                }
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_thread_items(child, out);
            }
        }
        _ => {}
    }
}

pub struct ThreadsSource {
    http: Client,
    config: ThreadsConfig,
    routing: Routing,
    /// Keyed by username
    marks: Mutex<HighWaterMark<String>>,
}

impl ThreadsSource {
    pub fn new(http: Client, config: ThreadsConfig, routing: Routing) -> Self {
        Self {
            http,
            config,
            routing,
            marks: Mutex::new(HighWaterMark::new()),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BotError::Scrape(format!("{} returned HTTP {}", url, status)));
        }
        Ok(resp.text().await?)
    }

    /// Root post first, then the replies shown on the page
    pub async fn scrape_thread(&self, url: &str) -> Result<Vec<ThreadPost>> {
        let html = self.fetch(url).await?;
        parse_page(&html, &self.config.base_url)
    }

    pub async fn user_posts(&self, username: &str) -> Result<Vec<ThreadPost>> {
        let html = self
            .fetch(&format!("{}/@{}", self.config.base_url, username))
            .await?;
        parse_page(&html, &self.config.base_url)
    }

    /// New posts of `username`; the mark advances to the newest one kept
    pub fn filter(&self, username: &str, posts: &[ThreadPost], now: i64) -> Vec<Message> {
        let key = username.to_string();
        let mut marks = self.marks.lock();
        let mut fresh: Vec<&ThreadPost> = posts
            .iter()
            .filter(|p| within_sla(now, p.taken_at, self.config.sla_secs))
            .filter(|p| marks.is_new(&key, p.taken_at))
            .collect();

        if let Some(newest) = fresh.iter().map(|p| p.taken_at).max() {
            marks.advance(key, newest);
        }

        fresh.sort_by_key(|p| p.taken_at);
        fresh
            .into_iter()
            .map(|post| self.to_message(username, post))
            .collect()
    }

    fn to_message(&self, username: &str, post: &ThreadPost) -> Message {
        let url = post.recent_url();
        let mut body = post_body(&post.text, &url);
        if is_trade_call(&post.text) {
            body.push_str(&format!(
                "\n\n<code>/freplies {}</code>",
                escape_html(&url)
            ));
        }
        let msg = Message::new(
            self.routing.chat_for(&post.text),
            self.routing.title(&format!("Threads - {}", username), post.taken_at),
            body,
        );
        match &post.image {
            Some(image) => msg.with_image(image.clone()),
            None => msg,
        }
    }
}

#[async_trait]
impl Source for ThreadsSource {
    fn name(&self) -> &str {
        "Threads"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_secs)
    }

    async fn poll(&self) -> Result<Vec<Message>> {
        let now = now_secs();
        let mut messages = Vec::new();
        for username in &self.config.usernames {
            match self.user_posts(username).await {
                Ok(posts) => messages.extend(self.filter(username, &posts, now)),
                Err(e) => messages.push(
                    self.routing
                        .error(&format!("Error Threads profile - {}", username), &e),
                ),
            }
        }
        Ok(messages)
    }
}
