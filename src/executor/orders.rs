//! Order construction
//!
//! Command arguments map one-to-one onto futures order fields; the only
//! computation is the entry quantity.

use crate::client::types::Position;
use crate::error::{BotError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize, Serializer};

/// Used when the symbol is missing from exchange info
pub const DEFAULT_QUANTITY_PRECISION: u32 = 3;
pub const DEFAULT_PRICE_PRECISION: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// `b`, `buy`, `long-b`... are buys, anything else sells
    pub fn from_arg(arg: &str) -> Self {
        if arg.to_lowercase().contains('b') {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    /// Side that opened a position of the given signed amount
    pub fn of_position(amount: Decimal) -> Self {
        if amount > Decimal::ZERO {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    TakeProfitMarket,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
        }
    }
}

/// A futures order as sent to the exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
    #[serde(skip_serializing_if = "is_false", serialize_with = "bool_as_str")]
    pub close_position: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn bool_as_str<S: Serializer>(value: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(if *value { "true" } else { "false" })
}

impl OrderRequest {
    fn new(symbol: &str, side: Side, order_type: OrderType) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type,
            quantity: None,
            price: None,
            stop_price: None,
            time_in_force: None,
            close_position: false,
        }
    }

    /// Form parameters for the single order endpoint
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", self.symbol.clone()),
            ("side", self.side.as_str().to_string()),
            ("type", self.order_type.as_str().to_string()),
        ];
        if let Some(quantity) = self.quantity {
            params.push(("quantity", quantity.to_string()));
        }
        if let Some(price) = self.price {
            params.push(("price", price.to_string()));
        }
        if let Some(stop_price) = self.stop_price {
            params.push(("stopPrice", stop_price.to_string()));
        }
        if let Some(tif) = &self.time_in_force {
            params.push(("timeInForce", tif.clone()));
        }
        if self.close_position {
            params.push(("closePosition", "true".to_string()));
        }
        params
    }

    /// Short human description, e.g. `SELL STOP_MARKET BTCUSDT`
    pub fn describe(&self) -> String {
        format!("{} {} {}", self.side.as_str(), self.order_type.as_str(), self.symbol)
    }
}

/// `margin * leverage / price` rounded to the symbol's quantity precision
pub fn quantity(margin: Decimal, leverage: u32, price: Decimal, precision: u32) -> Result<Decimal> {
    if price <= Decimal::ZERO {
        return Err(BotError::Execution(format!("Invalid price {}", price)));
    }
    let qty = (margin * Decimal::from(leverage) / price)
        .round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    if qty.is_zero() {
        return Err(BotError::Execution(format!(
            "Quantity rounds to zero (margin {}, leverage {}, price {})",
            margin, leverage, price
        )));
    }
    Ok(qty)
}

fn exit_order(symbol: &str, side: Side, order_type: OrderType, stop_price: Decimal) -> OrderRequest {
    let mut order = OrderRequest::new(symbol, side, order_type);
    order.stop_price = Some(stop_price);
    order.close_position = true;
    order
}

/// Market entry plus optional stop loss / take profit closing the position
pub fn market_batch(
    side: Side,
    symbol: &str,
    quantity: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> Vec<OrderRequest> {
    let mut entry = OrderRequest::new(symbol, side, OrderType::Market);
    entry.quantity = Some(quantity);

    let mut orders = vec![entry];
    if let Some(sl) = stop_loss {
        orders.push(exit_order(symbol, side.opposite(), OrderType::StopMarket, sl));
    }
    if let Some(tp) = take_profit {
        orders.push(exit_order(symbol, side.opposite(), OrderType::TakeProfitMarket, tp));
    }
    orders
}

pub fn limit_order(side: Side, symbol: &str, quantity: Decimal, price: Decimal) -> OrderRequest {
    let mut order = OrderRequest::new(symbol, side, OrderType::Limit);
    order.quantity = Some(quantity);
    order.price = Some(price);
    order.time_in_force = Some("GTC".to_string());
    order
}

/// One opposite-side market order per open position
pub fn close_orders(symbol: &str, positions: &[Position]) -> Vec<OrderRequest> {
    positions
        .iter()
        .filter(|p| p.is_open())
        .map(|p| {
            let side = Side::of_position(p.position_amt).opposite();
            let mut order = OrderRequest::new(symbol, side, OrderType::Market);
            order.quantity = Some(p.position_amt.abs());
            order
        })
        .collect()
}

/// Stop loss / take profit for every open position
pub fn tp_sl_orders(
    symbol: &str,
    positions: &[Position],
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> Vec<OrderRequest> {
    let mut orders = Vec::new();
    for position in positions.iter().filter(|p| p.is_open()) {
        let exit_side = Side::of_position(position.position_amt).opposite();
        if let Some(sl) = stop_loss {
            orders.push(exit_order(symbol, exit_side, OrderType::StopMarket, sl));
        }
        if let Some(tp) = take_profit {
            orders.push(exit_order(symbol, exit_side, OrderType::TakeProfitMarket, tp));
        }
    }
    orders
}
