//! Error types for the bot

use thiserror::Error;

/// Errors raised by sources, the exchange client and the command interface
#[derive(Debug, Error)]
pub enum BotError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Error body returned by the exchange (`{"code": -2019, "msg": "..."}`)
    #[error("Exchange error {code}: {msg}")]
    Exchange { code: i64, msg: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("Scrape error: {0}")]
    Scrape(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for BotError {
    fn from(err: config::ConfigError) -> Self {
        BotError::Config(err.to_string())
    }
}

impl BotError {
    /// Network hiccups that are not worth a message in the log chat
    pub fn is_transient(&self) -> bool {
        match self {
            BotError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
