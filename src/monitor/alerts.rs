//! Price alerts
//!
//! Alerts are entered as `op:coin:p1,p2[:gap]` and kept per symbol until they
//! trigger or are removed.

use crate::error::{BotError, Result};
use crate::utils::to_symbol;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::fmt;

/// Distance (percent of the alert price) that counts as reached
pub const DEFAULT_GAP: Decimal = dec!(0.5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOp {
    /// `<`: price falls to or below the level
    Below,
    /// `>`: price rises to or above the level
    Above,
}

impl AlertOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op.trim() {
            "<" => Some(AlertOp::Below),
            ">" => Some(AlertOp::Above),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            AlertOp::Below => "<",
            AlertOp::Above => ">",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceAlert {
    pub op: AlertOp,
    pub price: Decimal,
    /// Percent
    pub gap: Decimal,
}

impl PriceAlert {
    pub fn new(op: AlertOp, price: Decimal, gap: Decimal) -> Self {
        Self { op, price, gap }
    }

    /// Within `gap`% of the level, or past it in the alert's direction
    pub fn matches(&self, price: Decimal) -> bool {
        if !self.price.is_zero()
            && (self.price - price).abs() / self.price <= self.gap / Decimal::ONE_HUNDRED
        {
            return true;
        }
        match self.op {
            AlertOp::Below => price <= self.price,
            AlertOp::Above => price >= self.price,
        }
    }
}

impl fmt::Display for PriceAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({}%)", self.op.symbol(), self.price, self.gap)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertBook {
    alerts: BTreeMap<String, Vec<PriceAlert>>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.alerts.keys().cloned().collect()
    }

    pub fn get(&self, symbol: &str) -> Option<&[PriceAlert]> {
        self.alerts.get(symbol).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<PriceAlert>)> {
        self.alerts.iter()
    }

    /// Parse `op:coin:p1,p2[:gap]` and add one alert per price
    pub fn add(&mut self, input: &str) -> Result<String> {
        let parts: Vec<&str> = input.split(':').collect();
        if parts.len() < 3 || parts.len() > 4 {
            return Err(BotError::InvalidCommand(format!(
                "Format should be op:coin:price[,price...][:gap], got {}",
                input
            )));
        }

        let op = AlertOp::parse(parts[0])
            .ok_or_else(|| BotError::InvalidCommand(format!("Unknown operator {}", parts[0])))?;
        let symbol = to_symbol(parts[1]);
        let gap = match parts.get(3) {
            Some(raw) => parse_positive(raw)?,
            None => DEFAULT_GAP,
        };

        let prices = parts[2]
            .split(',')
            .map(parse_positive)
            .collect::<Result<Vec<_>>>()?;

        self.alerts
            .entry(symbol.clone())
            .or_default()
            .extend(prices.into_iter().map(|p| PriceAlert::new(op, p, gap)));
        Ok(symbol)
    }

    /// Remove `coin:all` or `coin:i,j,...` (indices as listed)
    pub fn remove(&mut self, input: &str) -> Result<String> {
        let (coin, which) = input.split_once(':').ok_or_else(|| {
            BotError::InvalidCommand(format!("Format should be coin:all or coin:i,j, got {}", input))
        })?;
        let symbol = to_symbol(coin);

        if which.trim().eq_ignore_ascii_case("all") {
            self.alerts.remove(&symbol);
            return Ok(symbol);
        }

        let alerts = self
            .alerts
            .get_mut(&symbol)
            .ok_or_else(|| BotError::InvalidCommand(format!("No alerts for {}", symbol)))?;

        let mut indices = which
            .split(',')
            .map(|raw| {
                raw.trim()
                    .parse::<usize>()
                    .map_err(|_| BotError::InvalidCommand(format!("Invalid index {}", raw)))
            })
            .collect::<Result<Vec<_>>>()?;
        if let Some(bad) = indices.iter().find(|&&i| i >= alerts.len()) {
            return Err(BotError::InvalidCommand(format!(
                "Index {} out of range for {} ({} alerts)",
                bad,
                symbol,
                alerts.len()
            )));
        }

        indices.sort_unstable();
        indices.dedup();
        for i in indices.into_iter().rev() {
            alerts.remove(i);
        }
        if alerts.is_empty() {
            self.alerts.remove(&symbol);
        }
        Ok(symbol)
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
    }

    /// Remove and return the alerts of `symbol` reached at `price`
    pub fn take_triggered(&mut self, symbol: &str, price: Decimal) -> Vec<PriceAlert> {
        let Some(alerts) = self.alerts.get_mut(symbol) else {
            return Vec::new();
        };
        let (triggered, remaining): (Vec<_>, Vec<_>) =
            alerts.drain(..).partition(|a| a.matches(price));
        *alerts = remaining;
        if alerts.is_empty() {
            self.alerts.remove(symbol);
        }
        triggered
    }
}

fn parse_positive(raw: &str) -> Result<Decimal> {
    let value: Decimal = raw
        .trim()
        .parse()
        .map_err(|_| BotError::InvalidCommand(format!("Invalid number {}", raw)))?;
    if value <= Decimal::ZERO {
        return Err(BotError::InvalidCommand(format!("{} must be positive", raw)));
    }
    Ok(value)
}
