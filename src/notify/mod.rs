//! Outbound notification channel
//!
//! Every source pushes `Message`s into one `NotificationQueue`; a single worker
//! drains it and delivers through the Bot API, so sends never interleave.

use crate::error::Result;
use crate::telegram::api::{is_parse_error, BotApi};
use crate::types::{Message, TextFormat};
use crate::utils::{escape_html, html_link};
use reqwest::Client;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Telegram limit on media group size
pub const MAX_MEDIA_GROUP: usize = 10;
/// Telegram limit on photo captions
pub const MAX_CAPTION_LEN: usize = 1024;

#[derive(Clone)]
pub struct Notifier {
    api: Option<Arc<BotApi>>,
    http: Client,
}

impl Notifier {
    pub fn new(api: Arc<BotApi>, http: Client) -> Self {
        Self {
            api: Some(api),
            http,
        }
    }

    /// Notifier that only logs titles, used for dry runs
    pub fn disabled() -> Self {
        Self {
            api: None,
            http: Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api.is_some()
    }

    pub async fn deliver(&self, msg: &Message) -> Result<()> {
        let Some(api) = &self.api else {
            tracing::info!("[{}] {}", msg.chat_id, msg.title);
            return Ok(());
        };

        if let Some(fwd) = &msg.forward {
            match api
                .forward_message(msg.chat_id, &fwd.from_chat, fwd.message_id)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) => tracing::warn!(
                    "Forward of {}/{} failed, publishing text: {}",
                    fwd.from_chat,
                    fwd.message_id,
                    e
                ),
            }
        }

        match self.try_deliver(api, msg).await {
            Err(e) if msg.format == TextFormat::Html && is_parse_error(&e) => {
                tracing::warn!("Telegram rejected HTML, resending as plain text: {}", e);
                self.try_deliver(api, &msg.to_plain()).await
            }
            other => other,
        }
    }

    async fn try_deliver(&self, api: &BotApi, msg: &Message) -> Result<()> {
        let text = msg.render();
        let images = msg.all_images();
        let fits_caption = text.chars().count() <= MAX_CAPTION_LEN;

        if images.len() > 1 && fits_caption {
            let urls: Vec<String> = images.into_iter().take(MAX_MEDIA_GROUP).collect();
            match api
                .send_media_group(msg.chat_id, &urls, &text, msg.format, msg.reply_to)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if is_parse_error(&e) => return Err(e),
                Err(e) => {
                    tracing::warn!("Media group failed, sending text: {}", e);
                    let text = append_line(&text, msg.format, &format!("Media error: {}", e));
                    api.send_message(msg.chat_id, &text, msg.format, msg.reply_to)
                        .await?;
                    return Ok(());
                }
            }
        }

        if let (Some(url), true) = (images.first(), fits_caption) {
            return self.deliver_photo(api, msg, url, &text).await;
        }

        let text = if images.is_empty() {
            text
        } else {
            images
                .iter()
                .fold(text, |acc, url| append_link(&acc, msg.format, url))
        };
        api.send_message(msg.chat_id, &text, msg.format, msg.reply_to)
            .await?;
        Ok(())
    }

    /// Photo by URL, then by upload, then plain text with the link
    async fn deliver_photo(&self, api: &BotApi, msg: &Message, url: &str, text: &str) -> Result<()> {
        let by_url = api
            .send_photo_url(msg.chat_id, url, text, msg.format, msg.reply_to)
            .await;
        let err = match by_url {
            Ok(_) => return Ok(()),
            Err(e) if is_parse_error(&e) => return Err(e),
            Err(e) => e,
        };
        tracing::debug!("sendPhoto by url failed ({}), uploading {}", err, url);

        match self.download(url).await {
            Ok(bytes) => match api
                .send_photo_bytes(msg.chat_id, bytes, text, msg.format, msg.reply_to)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if is_parse_error(&e) => return Err(e),
                Err(e) => tracing::warn!("Photo upload failed: {}", e),
            },
            Err(e) => tracing::warn!("Image download failed for {}: {}", url, e),
        }

        let text = append_link(text, msg.format, url);
        api.send_message(msg.chat_id, &text, msg.format, msg.reply_to)
            .await?;
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

fn append_line(text: &str, format: TextFormat, line: &str) -> String {
    match format {
        TextFormat::Html => format!("{}\n\n{}", text, escape_html(line)),
        TextFormat::Plain => format!("{}\n\n{}", text, line),
    }
}

fn append_link(text: &str, format: TextFormat, url: &str) -> String {
    match format {
        TextFormat::Html => format!("{}\n{}", text, html_link(url, "Image")),
        TextFormat::Plain => format!("{}\n{}", text, url),
    }
}

/// Handle used by sources and jobs to enqueue messages
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<Message>,
    log_chat: i64,
}

impl NotificationQueue {
    pub fn new(log_chat: i64) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, log_chat }, rx)
    }

    pub fn send(&self, msg: Message) {
        if self.tx.send(msg).is_err() {
            tracing::warn!("Notification queue closed, message dropped");
        }
    }

    pub fn log_chat(&self) -> i64 {
        self.log_chat
    }

    /// Log the error and forward it to the log chat
    pub fn report_error(&self, title: &str, err: &dyn Display) {
        tracing::error!("{}: {}", title, err);
        self.send(Message::new(self.log_chat, title, err.to_string()).plain());
    }

    /// Drain the queue until every sender is dropped
    pub async fn run_worker(notifier: Notifier, mut rx: mpsc::UnboundedReceiver<Message>) {
        tracing::info!("Notification worker started");
        while let Some(msg) = rx.recv().await {
            if let Err(e) = notifier.deliver(&msg).await {
                tracing::error!("Failed to deliver message to {}: {}", msg.chat_id, e);
            }
        }
        tracing::info!("Notification worker stopped");
    }
}

#[cfg(test)]
mod tests;
