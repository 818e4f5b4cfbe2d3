//! Telegram trading command interface
//!
//! Long-polls the trading bot for updates and hands every message to the
//! `CommandHandler`. On start the command list is registered and a banner with
//! the server IP and the redacted configuration is posted to the log chat.

pub mod api;
pub mod command;
pub mod format;
pub mod handler;
pub mod jobs;


pub use api::BotApi;
pub use command::BotCommand;
pub use handler::CommandHandler;

use crate::config::Config;
use crate::error::Result;
use crate::types::Message;
use crate::utils::{escape_html, format_timestamp, now_secs};
use std::sync::Arc;
use std::time::Duration;

/// Long-poll timeout of getUpdates
const POLL_TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct TelegramBot {
    api: Arc<BotApi>,
    handler: Arc<CommandHandler>,
    redacted: serde_json::Value,
    offset: i64,
}

impl TelegramBot {
    pub fn new(api: Arc<BotApi>, handler: Arc<CommandHandler>, config: &Config) -> Self {
        Self {
            api,
            handler,
            redacted: config.redacted(),
            offset: 0,
        }
    }

    /// Register commands and build the startup banner for the log chat
    pub async fn startup_banner(&self) -> Result<Message> {
        self.api.set_my_commands(&command::command_infos()).await?;
        let commands = self.api.get_my_commands().await?;
        let ip = self.handler.public_ip().await?;

        let mut body = format!(
            "<b>Your server public IP is <code>{}</code>, here is list commands:</b>\n",
            escape_html(&ip)
        );
        for cmd in &commands {
            body.push_str(&format!("/{} - {}\n", cmd.command, escape_html(&cmd.description)));
        }
        body.push_str(&format!(
            "<pre>{}</pre>",
            escape_html(&serde_json::to_string_pretty(&self.redacted)?)
        ));

        let tz = self.handler.tz();
        Ok(Message::new(
            self.handler.config().log_chat(),
            format!(
                "👋 Start News - Command Trade - Time: {}",
                format_timestamp(now_secs(), tz)
            ),
            body,
        ))
    }

    async fn poll_once(&mut self) -> Result<()> {
        let updates = self.api.get_updates(self.offset, POLL_TIMEOUT_SECS).await?;
        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);
            if let Some(msg) = update.message {
                self.handler.handle_message(&msg).await;
            }
        }
        Ok(())
    }

    pub async fn run(mut self) {
        tracing::info!("Starting Telegram command listener...");
        match self.startup_banner().await {
            Ok(banner) => self.handler.post_to_chat(banner).await,
            Err(e) => self.handler.queue().report_error("Error startup", &e),
        }

        loop {
            if let Err(e) = self.poll_once().await {
                tracing::error!("Failed to poll Telegram updates: {}", e);
                // Connection drops are routine for long polling
                if !e.is_transient() {
                    self.handler.queue().report_error("Error Telegram updates", &e);
                }
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}
