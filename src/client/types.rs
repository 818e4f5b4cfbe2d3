//! Exchange response types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::Value;

/// Amounts below this are treated as zero
pub const MARGIN_EPSILON: Decimal = dec!(0.01);

/// Error body returned with non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotAccount {
    pub balances: Vec<SpotBalance>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpotBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl SpotBalance {
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceTicker {
    pub symbol: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesAccount {
    pub total_wallet_balance: Decimal,
    pub total_unrealized_profit: Decimal,
    pub total_margin_balance: Decimal,
    pub available_balance: Decimal,
    #[serde(default)]
    pub total_initial_margin: Decimal,
    #[serde(default)]
    pub total_position_initial_margin: Decimal,
    #[serde(default)]
    pub total_open_order_initial_margin: Decimal,
}

impl FuturesAccount {
    /// Unrealized profit relative to wallet balance, in percent
    pub fn roi(&self) -> Decimal {
        if self.total_wallet_balance.is_zero() {
            return Decimal::ZERO;
        }
        (self.total_unrealized_profit / self.total_wallet_balance * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

/// Leverage and margin mode of a symbol
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSetting {
    pub symbol: String,
    pub leverage: Decimal,
    /// `cross` or `isolated`
    pub margin_type: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub position_amt: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    #[serde(rename = "unRealizedProfit")]
    pub unrealized_profit: Decimal,
    #[serde(default)]
    pub notional: Decimal,
    #[serde(default)]
    pub position_initial_margin: Decimal,
    #[serde(default)]
    pub open_order_initial_margin: Decimal,
}

impl Position {
    pub fn is_open(&self) -> bool {
        !self.position_amt.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.position_amt.is_sign_positive()
    }

    /// Limit orders show up as positions without initial margin
    pub fn has_margin(&self) -> bool {
        self.position_initial_margin > MARGIN_EPSILON
    }

    /// Effective leverage, notional over initial margin
    pub fn leverage(&self) -> Decimal {
        if self.position_initial_margin.is_zero() {
            return Decimal::ZERO;
        }
        (self.notional / self.position_initial_margin).abs().round()
    }

    /// Return on initial margin in percent
    pub fn roi(&self) -> Decimal {
        if self.position_initial_margin.is_zero() {
            return Decimal::ZERO;
        }
        (self.unrealized_profit / self.position_initial_margin * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub symbol: String,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub last_price: Decimal,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
}

impl Kline {
    /// Parse one row of the array-of-arrays kline response
    pub fn from_row(row: &[Value]) -> Option<Self> {
        let dec = |i: usize| -> Option<Decimal> { row.get(i)?.as_str()?.parse().ok() };
        Some(Self {
            open_time: row.first()?.as_i64()?,
            open: dec(1)?,
            high: dec(2)?,
            low: dec(3)?,
            close: dec(4)?,
            volume: dec(5)?,
            close_time: row.get(6)?.as_i64()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub order_id: i64,
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub side: String,
    #[serde(rename = "type", default)]
    pub order_type: String,
    #[serde(default)]
    pub orig_qty: Decimal,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub avg_price: Decimal,
}

/// One entry of a batch order response
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BatchResult {
    Failed { code: i64, msg: String },
    Placed(OrderAck),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeverageAck {
    pub symbol: String,
    pub leverage: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTrade {
    pub symbol: String,
    pub order_id: i64,
    pub side: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub realized_pnl: Decimal,
    #[serde(default)]
    pub commission: Decimal,
    pub time: i64,
}
