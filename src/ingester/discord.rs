//! Discord channels over the REST API with a user token

use super::{post_body, within_sla, HighWaterMark, Pause, Routing, Source};
use crate::config::DiscordConfig;
use crate::error::{BotError, Result};
use crate::types::Message;
use crate::utils::now_secs;
use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuildInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub timestamp: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub message_snapshots: Vec<Snapshot>,
}

/// Forwarded message content
#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
    pub message: SnapshotMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl DiscordMessage {
    pub fn unix_timestamp(&self) -> Option<i64> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.timestamp())
    }

    /// Content and attachments, taken from the first snapshot when forwarded
    pub fn payload(&self) -> (&str, Vec<String>) {
        let (content, attachments) = match self.message_snapshots.first() {
            Some(snapshot) => (&snapshot.message.content, &snapshot.message.attachments),
            None => (&self.content, &self.attachments),
        };
        (
            content.as_str(),
            attachments.iter().map(|a| a.url.clone()).collect(),
        )
    }
}

/// Channel with its guild, resolved at init
#[derive(Debug, Clone, PartialEq)]
pub struct WatchedChannel {
    pub channel_id: String,
    pub channel_name: String,
    pub guild_id: String,
    pub guild_name: String,
}

pub struct DiscordSource {
    http: Client,
    config: DiscordConfig,
    routing: Routing,
    pause: Pause,
    channels: RwLock<Vec<WatchedChannel>>,
    /// Keyed by channel id, newest message id seen
    marks: Mutex<HighWaterMark<String>>,
}

impl DiscordSource {
    pub fn new(http: Client, config: DiscordConfig, routing: Routing) -> Self {
        Self {
            http,
            config,
            routing,
            pause: Pause::new(2, 7),
            channels: RwLock::new(Vec::new()),
            marks: Mutex::new(HighWaterMark::new()),
        }
    }

    pub fn with_pause(mut self, pause: Pause) -> Self {
        self.pause = pause;
        self
    }

    pub fn channels(&self) -> Vec<WatchedChannel> {
        self.channels.read().clone()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(format!("{}{}", self.config.api_url, path))
            .header("Authorization", &self.config.token)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Api(format!("Discord {} HTTP {}: {}", path, status, body)));
        }
        Ok(resp.json().await?)
    }

    /// Channel and guild metadata for every configured channel
    pub async fn resolve_channels(&self) -> Result<Vec<WatchedChannel>> {
        let mut infos = Vec::new();
        for (i, id) in self.config.channel_ids.iter().enumerate() {
            if i > 0 {
                self.pause.wait().await;
            }
            let info: ChannelInfo = self.get(&format!("/channels/{}", id)).await?;
            infos.push(info);
        }

        let mut guilds: HashMap<String, GuildInfo> = HashMap::new();
        let mut watched = Vec::new();
        for info in infos {
            let guild_id = info.guild_id.clone().ok_or_else(|| {
                BotError::Api(format!("Discord channel {} has no guild", info.id))
            })?;
            if !guilds.contains_key(&guild_id) {
                self.pause.wait().await;
                let guild: GuildInfo = self.get(&format!("/guilds/{}", guild_id)).await?;
                guilds.insert(guild_id.clone(), guild);
            }
            let guild_name = guilds
                .get(&guild_id)
                .map(|g| g.name.clone())
                .unwrap_or_default();
            watched.push(WatchedChannel {
                channel_id: info.id,
                channel_name: info.name,
                guild_id,
                guild_name,
            });
        }
        Ok(watched)
    }

    pub async fn fetch_messages(&self, channel_id: &str) -> Result<Vec<DiscordMessage>> {
        let mut path = format!("/channels/{}/messages?limit={}", channel_id, self.config.limit);
        let last = self.marks.lock().get(&channel_id.to_string());
        if let Some(last) = last {
            path.push_str(&format!("&after={}", last));
        }
        self.get(&path).await
    }

    /// `messages` is newest first as returned by the API; output is oldest first
    pub fn filter(
        &self,
        channel: &WatchedChannel,
        messages: &[DiscordMessage],
        now: i64,
    ) -> Vec<Message> {
        if let Some(newest) = messages.iter().filter_map(|m| m.id.parse::<i64>().ok()).max() {
            self.marks.lock().advance(channel.channel_id.clone(), newest);
        }

        messages
            .iter()
            .rev()
            .filter_map(|m| {
                let ts = m.unix_timestamp()?;
                within_sla(now, ts, self.config.sla_secs).then(|| self.to_message(channel, m, ts))
            })
            .collect()
    }

    fn to_message(&self, channel: &WatchedChannel, msg: &DiscordMessage, ts: i64) -> Message {
        let url = format!(
            "https://discord.com/channels/{}/{}/{}",
            channel.guild_id, channel.channel_id, msg.id
        );
        let (content, mut images) = msg.payload();
        let out = Message::new(
            self.routing.chat_for(content),
            self.routing.title(
                &format!("Discord - {}-{}", channel.guild_name, channel.channel_name),
                ts,
            ),
            post_body(content, &url),
        );
        match images.len() {
            0 => out,
            1 => out.with_image(images.remove(0)),
            _ => out.with_images(images),
        }
    }
}

#[async_trait]
impl Source for DiscordSource {
    fn name(&self) -> &str {
        "Discord"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_secs)
    }

    async fn init(&self) -> Result<()> {
        let watched = self.resolve_channels().await?;
        tracing::info!("Discord watching {} channels", watched.len());
        *self.channels.write() = watched;
        Ok(())
    }

    async fn poll(&self) -> Result<Vec<Message>> {
        let now = now_secs();
        let mut messages = Vec::new();
        for (i, channel) in self.channels().iter().enumerate() {
            if i > 0 {
                self.pause.wait().await;
            }
            match self.fetch_messages(&channel.channel_id).await {
                Ok(batch) => messages.extend(self.filter(channel, &batch, now)),
                Err(e) => messages.push(self.routing.error(
                    &format!(
                        "Error Discord messages - {}-{}({})",
                        channel.guild_name, channel.channel_name, channel.channel_id
                    ),
                    &e,
                )),
            }
        }
        Ok(messages)
    }
}
