//! Trade execution
//!
//! Turns trading commands into exchange calls through `ExchangeApi`.

pub mod orders;

#[cfg(test)]
mod tests;

use crate::client::types::{BatchResult, OrderAck};
use crate::client::ExchangeApi;
use crate::error::Result;
use orders::{OrderRequest, Side, DEFAULT_QUANTITY_PRECISION};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Margin mode used for every entry
pub const MARGIN_TYPE: &str = "CROSSED";

/// An order the exchange refused
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFailure {
    pub order: OrderRequest,
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub orders: Vec<OrderRequest>,
    pub placed: Vec<(OrderRequest, OrderAck)>,
    pub failures: Vec<OrderFailure>,
}

impl ExecutionReport {
    fn collect(orders: Vec<OrderRequest>, results: Vec<BatchResult>) -> Self {
        let mut placed = Vec::new();
        let mut failures = Vec::new();
        for (order, result) in orders.iter().zip(results) {
            match result {
                BatchResult::Placed(ack) => placed.push((order.clone(), ack)),
                BatchResult::Failed { code, msg } if code < 0 => {
                    tracing::warn!("Order {} failed: {} {}", order.describe(), code, msg);
                    failures.push(OrderFailure {
                        order: order.clone(),
                        code,
                        msg,
                    });
                }
                BatchResult::Failed { code, msg } => {
                    tracing::debug!("Order {} returned {} {}", order.describe(), code, msg);
                }
            }
        }
        Self {
            orders,
            placed,
            failures,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Realised result of one closing order
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedOrder {
    pub order: OrderRequest,
    pub order_id: i64,
    pub pnl: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct CloseReport {
    pub execution: ExecutionReport,
    pub closed: Vec<ClosedOrder>,
}

impl CloseReport {
    pub fn total_pnl(&self) -> Decimal {
        self.closed.iter().map(|c| c.pnl).sum()
    }
}

pub struct Executor {
    exchange: Arc<dyn ExchangeApi>,
}

impl Executor {
    pub fn new(exchange: Arc<dyn ExchangeApi>) -> Self {
        Self { exchange }
    }

    /// Set leverage and cross margin if the symbol differs
    pub async fn prepare_symbol(&self, symbol: &str, leverage: u32) -> Result<()> {
        let settings = self.exchange.position_settings(symbol).await?;
        let current = settings.first();

        let leverage_matches = current
            .map(|s| s.leverage == Decimal::from(leverage))
            .unwrap_or(false);
        if !leverage_matches {
            tracing::info!("Changing {} leverage to {}x", symbol, leverage);
            self.exchange.change_leverage(symbol, leverage).await?;
        }

        let is_cross = current
            .map(|s| s.margin_type.eq_ignore_ascii_case("cross"))
            .unwrap_or(false);
        if !is_cross {
            tracing::info!("Changing {} margin type to {}", symbol, MARGIN_TYPE);
            self.exchange.change_margin_type(symbol, MARGIN_TYPE).await?;
        }
        Ok(())
    }

    async fn quantity_precision(&self, symbol: &str) -> Result<u32> {
        Ok(self
            .exchange
            .symbol_info(symbol)
            .await?
            .map(|info| info.quantity_precision)
            .unwrap_or(DEFAULT_QUANTITY_PRECISION))
    }

    /// Market entry with optional stop loss / take profit
    pub async fn market_order(
        &self,
        side: Side,
        symbol: &str,
        leverage: u32,
        margin: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<ExecutionReport> {
        self.prepare_symbol(symbol, leverage).await?;

        let price = self.exchange.futures_price(symbol).await?;
        let precision = self.quantity_precision(symbol).await?;
        let quantity = orders::quantity(margin, leverage, price, precision)?;

        let batch = orders::market_batch(side, symbol, quantity, stop_loss, take_profit);
        tracing::info!(
            "Market {} {} qty {} @ ~{} ({}x, margin {})",
            side.as_str(),
            symbol,
            quantity,
            price,
            leverage,
            margin
        );
        let results = self.exchange.place_batch(&batch).await?;
        Ok(ExecutionReport::collect(batch, results))
    }

    pub async fn limit_order(
        &self,
        side: Side,
        symbol: &str,
        leverage: u32,
        margin: Decimal,
        price: Decimal,
    ) -> Result<(OrderRequest, OrderAck)> {
        self.prepare_symbol(symbol, leverage).await?;

        let precision = self.quantity_precision(symbol).await?;
        let quantity = orders::quantity(margin, leverage, price, precision)?;
        let order = orders::limit_order(side, symbol, quantity, price);
        let ack = self.exchange.place_order(&order).await?;
        Ok((order, ack))
    }

    /// Cancel open orders, close every position and sum realised PnL
    pub async fn close_position(&self, symbol: &str) -> Result<CloseReport> {
        self.exchange.cancel_all_open_orders(symbol).await?;

        let positions = self.exchange.symbol_positions(symbol).await?;
        let batch = orders::close_orders(symbol, &positions);
        if batch.is_empty() {
            return Ok(CloseReport::default());
        }

        let results = self.exchange.place_batch(&batch).await?;
        let execution = ExecutionReport::collect(batch, results);

        let mut closed = Vec::new();
        for (order, ack) in &execution.placed {
            let trades = self.exchange.user_trades(symbol, ack.order_id).await?;
            let pnl: Decimal = trades.iter().map(|t| t.realized_pnl).sum();
            closed.push(ClosedOrder {
                order: order.clone(),
                order_id: ack.order_id,
                pnl: pnl.round_dp(2),
            });
        }

        Ok(CloseReport { execution, closed })
    }

    /// Stop loss / take profit for the open positions of `symbol`
    pub async fn set_tp_sl(
        &self,
        symbol: &str,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<ExecutionReport> {
        let positions = self.exchange.symbol_positions(symbol).await?;
        let batch = orders::tp_sl_orders(symbol, &positions, stop_loss, take_profit);
        if batch.is_empty() {
            return Ok(ExecutionReport::default());
        }
        let results = self.exchange.place_batch(&batch).await?;
        Ok(ExecutionReport::collect(batch, results))
    }
}
