//! Exchange REST client
//!
//! `ExchangeApi` is the seam between the command interface and the exchange;
//! `BinanceClient` implements it over signed REST calls.

pub mod auth;
pub mod binance;
pub mod types;


pub use binance::BinanceClient;

use crate::error::Result;
use crate::executor::orders::OrderRequest;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use types::*;

/// Maximum orders accepted by one batch request
pub const MAX_BATCH_ORDERS: usize = 5;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

/// HTTP client with timeout and optional proxy
pub fn http_client(timeout: Duration, proxy: Option<reqwest::Proxy>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT);
    if let Some(proxy) = proxy {
        builder = builder.proxy(proxy);
    }
    Ok(builder.build()?)
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Spot balances with a non-zero total
    async fn spot_balances(&self) -> Result<Vec<SpotBalance>>;

    async fn spot_price(&self, symbol: &str) -> Result<Decimal>;

    async fn futures_account(&self) -> Result<FuturesAccount>;

    /// Leverage and margin type
    async fn position_settings(&self, symbol: &str) -> Result<Vec<PositionSetting>>;

    /// All open positions
    async fn positions(&self) -> Result<Vec<Position>>;

    /// Open positions of one symbol
    async fn symbol_positions(&self, symbol: &str) -> Result<Vec<Position>>;

    /// Precision info, `None` for unknown symbols
    async fn symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>>;

    async fn futures_price(&self, symbol: &str) -> Result<Decimal>;

    async fn ticker_24h(&self, symbol: &str) -> Result<Ticker24h>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck>;

    /// One result per order, in order
    async fn place_batch(&self, orders: &[OrderRequest]) -> Result<Vec<BatchResult>>;

    async fn change_leverage(&self, symbol: &str, leverage: u32) -> Result<LeverageAck>;

    async fn change_margin_type(&self, symbol: &str, margin_type: &str) -> Result<()>;

    async fn cancel_all_open_orders(&self, symbol: &str) -> Result<()>;

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Kline>>;

    /// Fills of one order
    async fn user_trades(&self, symbol: &str, order_id: i64) -> Result<Vec<UserTrade>>;
}
