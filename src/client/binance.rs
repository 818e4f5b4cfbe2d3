//! Binance spot + USDⓈ-M futures REST client

use super::auth::{encode_query, RequestSigner, API_KEY_HEADER};
use super::types::*;
use super::{http_client, ExchangeApi, MAX_BATCH_ORDERS};
use crate::config::BinanceConfig;
use crate::error::{BotError, Result};
use crate::executor::orders::OrderRequest;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Returned when the margin type is already the requested one
const NO_NEED_TO_CHANGE_MARGIN: i64 = -4046;
pub(crate) const KLINE_LIMIT: usize = 1500;

pub struct BinanceClient {
    http: Client,
    signer: RequestSigner,
    spot_url: String,
    futures_url: String,
    /// Exchange info, fetched once
    symbols: RwLock<HashMap<String, SymbolInfo>>,
}

impl BinanceClient {
    pub fn new(config: &BinanceConfig) -> Result<Self> {
        let proxy = match &config.proxy_url {
            Some(url) if !url.is_empty() => Some(reqwest::Proxy::all(url.as_str())?),
            _ => None,
        };
        let http = http_client(Duration::from_secs(config.timeout_secs), proxy)?;

        Ok(Self {
            http,
            signer: RequestSigner::new(&config.api_key, &config.api_secret, config.recv_window),
            spot_url: config.spot_base_url(),
            futures_url: config.futures_base_url(),
            symbols: RwLock::new(HashMap::new()),
        })
    }

    /// Point both APIs elsewhere (tests, testnet)
    pub fn with_base_urls(mut self, spot_url: &str, futures_url: &str) -> Self {
        self.spot_url = spot_url.trim_end_matches('/').to_string();
        self.futures_url = futures_url.trim_end_matches('/').to_string();
        self
    }

    fn timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        base: &str,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let query = encode_query(params);
        let url = if query.is_empty() {
            format!("{}{}", base, endpoint)
        } else {
            format!("{}{}?{}", base, endpoint, query)
        };
        tracing::debug!("GET {}", url);

        let response = self.http.get(&url).send().await?;
        Self::handle_response(response).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        base: &str,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        if !self.signer.has_credentials() {
            return Err(BotError::Auth("Binance API key/secret not configured".into()));
        }
        let query = self.signer.signed_query(params, Self::timestamp_ms())?;
        let url = format!("{}{}", base, endpoint);
        tracing::debug!("{} (signed) {}", method, endpoint);

        let request = if method == Method::POST {
            self.http
                .post(&url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(query)
        } else {
            self.http.request(method, format!("{}?{}", url, query))
        };

        let response = request
            .header(API_KEY_HEADER, self.signer.api_key())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| {
                tracing::error!("Failed to parse response: {} - Body: {}", e, body);
                BotError::Json(e)
            })
        } else if let Ok(error) = serde_json::from_str::<ErrorBody>(&body) {
            Err(BotError::Exchange {
                code: error.code,
                msg: error.msg,
            })
        } else {
            Err(BotError::Api(format!("HTTP {}: {}", status.as_u16(), body)))
        }
    }

    async fn load_exchange_info(&self) -> Result<()> {
        let info: ExchangeInfo = self
            .public_get(&self.futures_url, "/fapi/v1/exchangeInfo", &[])
            .await?;
        let mut symbols = self.symbols.write();
        for symbol in info.symbols {
            symbols.insert(symbol.symbol.clone(), symbol);
        }
        tracing::info!("Loaded exchange info for {} symbols", symbols.len());
        Ok(())
    }
}

#[async_trait]
impl ExchangeApi for BinanceClient {
    async fn spot_balances(&self) -> Result<Vec<SpotBalance>> {
        let account: SpotAccount = self
            .signed(
                Method::GET,
                &self.spot_url,
                "/api/v3/account",
                &[("omitZeroBalances", "true".to_string())],
            )
            .await?;
        Ok(account
            .balances
            .into_iter()
            .filter(|b| !b.total().is_zero())
            .collect())
    }

    async fn spot_price(&self, symbol: &str) -> Result<Decimal> {
        let ticker: PriceTicker = self
            .public_get(&self.spot_url, "/api/v3/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        Ok(ticker.price)
    }

    async fn futures_account(&self) -> Result<FuturesAccount> {
        self.signed(Method::GET, &self.futures_url, "/fapi/v2/account", &[])
            .await
    }

    async fn position_settings(&self, symbol: &str) -> Result<Vec<PositionSetting>> {
        self.signed(
            Method::GET,
            &self.futures_url,
            "/fapi/v2/positionRisk",
            &[("symbol", symbol.to_string())],
        )
        .await
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        let positions: Vec<Position> = self
            .signed(Method::GET, &self.futures_url, "/fapi/v3/positionRisk", &[])
            .await?;
        Ok(positions.into_iter().filter(Position::is_open).collect())
    }

    async fn symbol_positions(&self, symbol: &str) -> Result<Vec<Position>> {
        let positions: Vec<Position> = self
            .signed(
                Method::GET,
                &self.futures_url,
                "/fapi/v3/positionRisk",
                &[("symbol", symbol.to_string())],
            )
            .await?;
        Ok(positions.into_iter().filter(Position::is_open).collect())
    }

    async fn symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>> {
        if self.symbols.read().is_empty() {
            self.load_exchange_info().await?;
        }
        Ok(self.symbols.read().get(symbol).cloned())
    }

    async fn futures_price(&self, symbol: &str) -> Result<Decimal> {
        let ticker: PriceTicker = self
            .public_get(
                &self.futures_url,
                "/fapi/v1/ticker/price",
                &[("symbol", symbol.to_string())],
            )
            .await?;
        Ok(ticker.price)
    }

    async fn ticker_24h(&self, symbol: &str) -> Result<Ticker24h> {
        self.public_get(
            &self.futures_url,
            "/fapi/v1/ticker/24hr",
            &[("symbol", symbol.to_string())],
        )
        .await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        tracing::info!("Placing order: {}", order.describe());
        self.signed(Method::POST, &self.futures_url, "/fapi/v1/order", &order.to_params())
            .await
    }

    async fn place_batch(&self, orders: &[OrderRequest]) -> Result<Vec<BatchResult>> {
        let mut results = Vec::with_capacity(orders.len());
        for chunk in orders.chunks(MAX_BATCH_ORDERS) {
            let batch = serde_json::to_string(chunk)?;
            tracing::info!("Placing batch of {} orders: {}", chunk.len(), batch);
            let chunk_results: Vec<BatchResult> = self
                .signed(
                    Method::POST,
                    &self.futures_url,
                    "/fapi/v1/batchOrders",
                    &[("batchOrders", batch)],
                )
                .await?;
            results.extend(chunk_results);
        }
        Ok(results)
    }

    async fn change_leverage(&self, symbol: &str, leverage: u32) -> Result<LeverageAck> {
        self.signed(
            Method::POST,
            &self.futures_url,
            "/fapi/v1/leverage",
            &[("symbol", symbol.to_string()), ("leverage", leverage.to_string())],
        )
        .await
    }

    async fn change_margin_type(&self, symbol: &str, margin_type: &str) -> Result<()> {
        let result: Result<Value> = self
            .signed(
                Method::POST,
                &self.futures_url,
                "/fapi/v1/marginType",
                &[("symbol", symbol.to_string()), ("marginType", margin_type.to_string())],
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(BotError::Exchange { code, .. }) if code == NO_NEED_TO_CHANGE_MARGIN => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn cancel_all_open_orders(&self, symbol: &str) -> Result<()> {
        let _: Value = self
            .signed(
                Method::DELETE,
                &self.futures_url,
                "/fapi/v1/allOpenOrders",
                &[("symbol", symbol.to_string())],
            )
            .await?;
        Ok(())
    }

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Kline>> {
        let mut klines = Vec::new();
        let mut start = start_ms;
        // A full page means more bars may follow its last close time
        while start < end_ms {
            let rows: Vec<Vec<Value>> = self
                .public_get(
                    &self.futures_url,
                    "/fapi/v1/klines",
                    &[
                        ("symbol", symbol.to_string()),
                        ("interval", interval.to_string()),
                        ("startTime", start.to_string()),
                        ("endTime", end_ms.to_string()),
                        ("limit", KLINE_LIMIT.to_string()),
                    ],
                )
                .await?;
            let full_page = rows.len() >= KLINE_LIMIT;
            let page: Vec<Kline> = rows.iter().filter_map(|row| Kline::from_row(row)).collect();
            let next = match page.last() {
                Some(last) => last.close_time + 1,
                None => break,
            };
            klines.extend(page);
            if !full_page || next <= start {
                break;
            }
            start = next;
        }
        Ok(klines)
    }

    async fn user_trades(&self, symbol: &str, order_id: i64) -> Result<Vec<UserTrade>> {
        self.signed(
            Method::GET,
            &self.futures_url,
            "/fapi/v1/userTrades",
            &[("symbol", symbol.to_string()), ("orderId", order_id.to_string())],
        )
        .await
    }
}
