//! Configuration
//!
//! Loaded from a TOML file layered with `NEWS_TRADE__SECTION__KEY` environment
//! overrides (a `.env` file is read first when present).

use crate::error::{BotError, Result};
use chrono_tz::Tz;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "NEWS_TRADE";
const MASK: &str = "....";

/// Keys that are read as space separated lists from the environment
const LIST_KEYS: &[&str] = &[
    "telegram.admin_ids",
    "twitter.queries",
    "threads.usernames",
    "channels.channels",
    "discord.channel_ids",
];

const SECRET_POINTERS: &[&str] = &[
    "/telegram/bot_token",
    "/telegram/trading_bot_token",
    "/twitter/bearer_token",
    "/discord/token",
    "/binance/api_key",
    "/binance/api_secret",
];

const PROXY_POINTERS: &[&str] = &["/proxy/tor/url", "/proxy/telegram/url", "/binance/proxy_url"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub threads: ThreadsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub binance: BinanceConfig,
    #[serde(default)]
    pub proxy: ProxySettings,
    /// IANA zone used for every timestamp shown in Telegram
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Config {
    /// Load configuration from file + environment
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = shellexpand::tilde(path).into_owned();

        let mut env = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .list_separator(" ")
            .try_parsing(true);
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(env)
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without touching the environment
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(BotError::Config("telegram.bot_token is required".into()));
        }
        self.tz()?;

        if self.twitter.enabled && self.twitter.bearer_token.as_deref().unwrap_or("").is_empty() {
            return Err(BotError::Config(
                "twitter.enabled requires twitter.bearer_token".into(),
            ));
        }
        if self.discord.enabled && self.discord.token.trim().is_empty() {
            return Err(BotError::Config("discord.enabled requires discord.token".into()));
        }

        let intervals = [
            ("twitter", self.twitter.interval_secs),
            ("threads", self.threads.interval_secs),
            ("channels", self.channels.interval_secs),
            ("discord", self.discord.interval_secs),
        ];
        for (name, secs) in intervals {
            if secs == 0 {
                return Err(BotError::Config(format!("{}.interval_secs must be > 0", name)));
            }
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| BotError::Config(format!("Invalid timezone {}: {}", self.timezone, e)))
    }

    /// JSON view of the configuration with secrets masked
    pub fn redacted(&self) -> serde_json::Value {
        let mut value = match serde_json::to_value(self) {
            Ok(v) => v,
            Err(e) => return serde_json::json!({ "error": e.to_string() }),
        };

        for pointer in SECRET_POINTERS {
            if let Some(v) = value.pointer_mut(pointer) {
                if !v.is_null() && v.as_str() != Some("") {
                    *v = serde_json::Value::String(MASK.to_string());
                }
            }
        }
        for pointer in PROXY_POINTERS {
            if let Some(v) = value.pointer_mut(pointer) {
                if let Some(url) = v.as_str() {
                    *v = serde_json::Value::String(mask_url_credentials(url));
                }
            }
        }
        value
    }
}

/// Replace `user:password@` in a URL with the mask
pub fn mask_url_credentials(raw: &str) -> String {
    match raw.split_once("://") {
        Some((scheme, rest)) => match rest.rsplit_once('@') {
            Some((_, host)) => format!("{}://{}@{}", scheme, MASK, host),
            None => raw.to_string(),
        },
        None => raw.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Token of the bot that publishes aggregated posts
    pub bot_token: String,
    /// Token of the bot that answers trading commands (defaults to `bot_token`)
    #[serde(default)]
    pub trading_bot_token: Option<String>,
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
    pub news_chat_id: i64,
    #[serde(default)]
    pub trade_chat_id: Option<i64>,
    #[serde(default)]
    pub log_chat_id: Option<i64>,
    #[serde(default)]
    pub alert_chat_id: Option<i64>,
    /// Discussion group linked to the trade channel, used for reply tracking
    #[serde(default)]
    pub group_chat_id: Option<i64>,
    #[serde(default)]
    pub pnl_chat_id: Option<i64>,
    /// Total ROI (%) above which PnL reports mention the owner
    #[serde(default = "default_roi_signal")]
    pub roi_signal: Decimal,
    /// Owner handle appended to alerts, e.g. `@me`
    #[serde(default)]
    pub mention: String,
    /// User ids allowed to issue commands; empty allows everyone
    #[serde(default)]
    pub admin_ids: Vec<i64>,
}

impl TelegramConfig {
    pub fn trading_token(&self) -> &str {
        self.trading_bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.bot_token)
    }

    pub fn trade_chat(&self) -> i64 {
        self.trade_chat_id.unwrap_or(self.news_chat_id)
    }

    pub fn log_chat(&self) -> i64 {
        self.log_chat_id.unwrap_or(self.news_chat_id)
    }

    pub fn alert_chat(&self) -> i64 {
        self.alert_chat_id.unwrap_or_else(|| self.log_chat())
    }

    /// Where tracked replies are posted
    pub fn group_chat(&self) -> i64 {
        self.group_chat_id.unwrap_or_else(|| self.log_chat())
    }

    pub fn pnl_chat(&self) -> i64 {
        self.pnl_chat_id.unwrap_or_else(|| self.log_chat())
    }

    pub fn is_admin(&self, user_id: Option<i64>) -> bool {
        if self.admin_ids.is_empty() {
            return true;
        }
        user_id.map(|id| self.admin_ids.contains(&id)).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Search queries, e.g. `from:binance`
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default = "default_twitter_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_twitter_sla")]
    pub sla_secs: i64,
    #[serde(default = "default_tweets_count")]
    pub tweets_count: u32,
    #[serde(default = "default_twitter_api_url")]
    pub api_url: String,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bearer_token: None,
            queries: Vec::new(),
            interval_secs: default_twitter_interval(),
            sla_secs: default_twitter_sla(),
            tweets_count: default_tweets_count(),
            api_url: default_twitter_api_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub usernames: Vec<String>,
    #[serde(default = "default_threads_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_short_sla")]
    pub sla_secs: i64,
    #[serde(default = "default_threads_url")]
    pub base_url: String,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            usernames: Vec::new(),
            interval_secs: default_threads_interval(),
            sla_secs: default_short_sla(),
            base_url: default_threads_url(),
        }
    }
}

/// Public Telegram channels read through the web preview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_short_sla")]
    pub sla_secs: i64,
    #[serde(default = "default_channels_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_preview_url")]
    pub preview_url: String,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channels: Vec::new(),
            limit: default_limit(),
            sla_secs: default_short_sla(),
            interval_secs: default_channels_interval(),
            preview_url: default_preview_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub channel_ids: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_short_sla")]
    pub sla_secs: i64,
    #[serde(default = "default_discord_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_discord_api_url")]
    pub api_url: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            channel_ids: Vec::new(),
            limit: default_limit(),
            sla_secs: default_short_sla(),
            interval_secs: default_discord_interval(),
            api_url: default_discord_api_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// Top level domain of the API hosts (`com`, `us`, ...)
    #[serde(default = "default_tld")]
    pub tld: String,
    #[serde(default = "default_recv_window")]
    pub recv_window: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub spot_url: Option<String>,
    #[serde(default)]
    pub futures_url: Option<String>,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            tld: default_tld(),
            recv_window: default_recv_window(),
            timeout_secs: default_timeout(),
            proxy_url: None,
            spot_url: None,
            futures_url: None,
        }
    }
}

impl BinanceConfig {
    pub fn spot_base_url(&self) -> String {
        self.spot_url
            .clone()
            .unwrap_or_else(|| format!("https://api.binance.{}", self.tld))
    }

    pub fn futures_base_url(&self) -> String {
        self.futures_url
            .clone()
            .unwrap_or_else(|| format!("https://fapi.binance.{}", self.tld))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Used by the scraping sources
    #[serde(default)]
    pub tor: Option<ProxyConfig>,
    /// Used by the Bot API clients
    #[serde(default)]
    pub telegram: Option<ProxyConfig>,
}

/// A proxy host exposing `ports` sequential ports starting at the URL's port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// e.g. `socks5://127.0.0.1:9050`
    pub url: String,
    #[serde(default = "default_proxy_ports")]
    pub ports: u16,
}

impl ProxyConfig {
    /// Proxy URL on a randomly chosen port
    pub fn pick(&self) -> Result<String> {
        let mut parsed = url::Url::parse(self.url.trim())
            .map_err(|e| BotError::Config(format!("Invalid proxy url: {}", e)))?;
        let start = parsed.port().unwrap_or(9050);
        let offset = rand::rng().random_range(0..self.ports.max(1));
        let port = start
            .checked_add(offset)
            .ok_or_else(|| BotError::Config("Proxy port range overflows".into()))?;
        parsed
            .set_port(Some(port))
            .map_err(|_| BotError::Config("Proxy url cannot carry a port".into()))?;
        Ok(parsed.to_string())
    }

    pub fn to_reqwest(&self) -> Result<reqwest::Proxy> {
        Ok(reqwest::Proxy::all(self.pick()?)?)
    }
}

fn default_timezone() -> String {
    "Asia/Ho_Chi_Minh".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_roi_signal() -> Decimal {
    Decimal::TEN
}

fn default_twitter_interval() -> u64 {
    600
}

fn default_twitter_sla() -> i64 {
    86_400
}

fn default_tweets_count() -> u32 {
    5
}

fn default_twitter_api_url() -> String {
    "https://api.twitter.com/2".to_string()
}

fn default_threads_interval() -> u64 {
    60
}

fn default_short_sla() -> i64 {
    600
}

fn default_threads_url() -> String {
    "https://www.threads.net".to_string()
}

fn default_limit() -> usize {
    10
}

fn default_channels_interval() -> u64 {
    30
}

fn default_preview_url() -> String {
    "https://t.me/s".to_string()
}

fn default_discord_interval() -> u64 {
    60
}

fn default_discord_api_url() -> String {
    "https://discord.com/api/v9".to_string()
}

fn default_tld() -> String {
    "com".to_string()
}

fn default_recv_window() -> u64 {
    5000
}

fn default_timeout() -> u64 {
    30
}

fn default_proxy_ports() -> u16 {
    1
}
