//! News Trade Bot
//!
//! Aggregates posts from X, Threads, public Telegram channels and Discord into
//! Telegram chats, and exposes a Telegram command interface for Binance
//! USDⓈ-M futures.
//!
//! ## Architecture
//!
//! ```text
//! Sources (X/Threads/TG/Discord) → NotificationQueue → Notifier → Telegram chats
//!                                        ↑
//! TelegramBot → CommandHandler → Executor → ExchangeApi (Binance)
//!                     ↓
//!          Jobs (PnL stats, price alerts, Threads replies)
//! ```

pub mod analysis;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod ingester;
pub mod monitor;
pub mod notify;
pub mod telegram;
pub mod types;
pub mod utils;
