//! X / Twitter recent search
//!
//! Runs every configured query against the v2 recent search endpoint and keeps
//! tweets newer than the author's high-water mark.

use super::{post_body, within_sla, HighWaterMark, Pause, Routing, Source};
use crate::config::TwitterConfig;
use crate::error::{BotError, Result};
use crate::types::Message;
use crate::utils::now_secs;
use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Accepted range of `max_results` for recent search
const MIN_RESULTS: u32 = 10;
const MAX_RESULTS: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<Tweet>,
    #[serde(default)]
    pub includes: Includes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<TwitterUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitterUser {
    pub id: String,
    pub name: String,
    pub username: String,
}

pub struct TwitterSource {
    http: Client,
    config: TwitterConfig,
    routing: Routing,
    pause: Pause,
    /// Keyed by author id
    marks: Mutex<HighWaterMark<String>>,
}

impl TwitterSource {
    pub fn new(http: Client, config: TwitterConfig, routing: Routing) -> Self {
        Self {
            http,
            config,
            routing,
            pause: Pause::new(5, 10),
            marks: Mutex::new(HighWaterMark::new()),
        }
    }

    pub fn with_pause(mut self, pause: Pause) -> Self {
        self.pause = pause;
        self
    }

    pub async fn search(&self, query: &str) -> Result<SearchResponse> {
        let token = self
            .config
            .bearer_token
            .as_deref()
            .ok_or_else(|| BotError::Auth("twitter.bearer_token is not set".into()))?;
        let max_results = self
            .config
            .tweets_count
            .clamp(MIN_RESULTS, MAX_RESULTS)
            .to_string();

        let resp = self
            .http
            .get(format!("{}/tweets/search/recent", self.config.api_url))
            .bearer_auth(token)
            .query(&[
                ("query", query),
                ("max_results", max_results.as_str()),
                ("expansions", "author_id"),
                ("user.fields", "username,name"),
                ("tweet.fields", "created_at"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Api(format!("Twitter search HTTP {}: {}", status, body)));
        }
        // The API returns newest first and never fewer than MIN_RESULTS
        let mut found: SearchResponse = resp.json().await?;
        found.data.truncate(self.config.tweets_count as usize);
        Ok(found)
    }

    /// Tweets within the SLA and past each author's mark, oldest first
    pub fn filter(&self, resp: SearchResponse, now: i64) -> Vec<Message> {
        let users: HashMap<&str, &TwitterUser> = resp
            .includes
            .users
            .iter()
            .map(|u| (u.id.as_str(), u))
            .collect();

        let mut tweets: Vec<(i64, &Tweet)> = resp
            .data
            .iter()
            .filter_map(|t| {
                let ts = DateTime::parse_from_rfc3339(&t.created_at).ok()?.timestamp();
                Some((ts, t))
            })
            .collect();
        tweets.sort_by_key(|(ts, _)| *ts);

        let mut marks = self.marks.lock();
        let mut advanced: HashMap<String, i64> = HashMap::new();
        let mut messages = Vec::new();

        for (ts, tweet) in tweets {
            if !within_sla(now, ts, self.config.sla_secs) || !marks.is_new(&tweet.author_id, ts) {
                continue;
            }
            let (name, username) = match users.get(tweet.author_id.as_str()) {
                Some(user) => (user.name.as_str(), user.username.as_str()),
                None => (tweet.author_id.as_str(), "i"),
            };
            let url = format!("https://x.com/{}/status/{}", username, tweet.id);
            let entry = advanced.entry(tweet.author_id.clone()).or_insert(ts);
            *entry = (*entry).max(ts);

            messages.push(Message::new(
                self.routing.chat_for(&tweet.text),
                self.routing.title(&format!("Twitter - {}", name), ts),
                post_body(&tweet.text, &url),
            ));
        }

        // Marks move once per batch
        for (author, ts) in advanced {
            marks.advance(author, ts);
        }
        messages
    }
}

#[async_trait]
impl Source for TwitterSource {
    fn name(&self) -> &str {
        "Twitter"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_secs)
    }

    async fn init(&self) -> Result<()> {
        if self.config.bearer_token.is_none() {
            return Err(BotError::Auth("twitter.bearer_token is not set".into()));
        }
        Ok(())
    }

    async fn poll(&self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        for (i, query) in self.config.queries.iter().enumerate() {
            if i > 0 {
                self.pause.wait().await;
            }
            tracing::debug!("Twitter search: {}", query);
            match self.search(query).await {
                Ok(resp) => messages.extend(self.filter(resp, now_secs())),
                Err(e) => messages.push(
                    self.routing
                        .error(&format!("Error Twitter search - {}", query), &e),
                ),
            }
        }
        Ok(messages)
    }
}
