//! Market text rendering
//!
//! `/fch` answers with a compact text summary of recent klines instead of an
//! image chart.

#[cfg(test)]
mod tests;

use crate::client::types::Kline;
use crate::utils::{duration_to_secs, format_timestamp};
use chrono_tz::Tz;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub const DEFAULT_INTERVAL: &str = "15m";
/// Bars shown when no range is given
pub const DEFAULT_BARS: i64 = 21;
/// Longer ranges are cut to this many bars
pub const MAX_BARS: i64 = 30_000;

/// Kline intervals accepted by the futures API
pub const VALID_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

const SPARK_LEVELS: &[char] = &['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
/// Sparkline is downsampled to at most this many characters
const SPARK_WIDTH: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineWindow {
    pub interval: String,
    pub range_secs: i64,
}

impl KlineWindow {
    /// `(start, end)` in milliseconds ending at `now_secs`
    pub fn bounds_ms(&self, now_secs: i64) -> (i64, i64) {
        (
            now_secs.saturating_sub(self.range_secs).saturating_mul(1000),
            now_secs.saturating_mul(1000),
        )
    }
}

/// Unknown intervals fall back to 15m, missing or invalid ranges to 21 bars.
/// The range never exceeds `MAX_BARS` bars.
pub fn resolve_window(interval: Option<&str>, range: Option<&str>) -> KlineWindow {
    let interval = interval
        .filter(|i| VALID_INTERVALS.contains(i))
        .unwrap_or(DEFAULT_INTERVAL)
        .to_string();
    let bar_secs = duration_to_secs(&interval).unwrap_or(900);
    let range_secs = range
        .and_then(duration_to_secs)
        .unwrap_or(bar_secs * DEFAULT_BARS)
        .min(bar_secs * MAX_BARS);
    KlineWindow {
        interval,
        range_secs,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KlineSummary {
    pub symbol: String,
    pub interval: String,
    pub bars: usize,
    pub start: i64,
    pub end: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub change_pct: Decimal,
    pub volume: Decimal,
    pub sparkline: String,
}

impl KlineSummary {
    /// `None` when there are no klines
    pub fn from_klines(symbol: &str, interval: &str, klines: &[Kline]) -> Option<Self> {
        let first = klines.first()?;
        let last = klines.last()?;

        let high = klines.iter().map(|k| k.high).max()?;
        let low = klines.iter().map(|k| k.low).min()?;
        let volume = klines.iter().map(|k| k.volume).sum();
        let change_pct = if first.open.is_zero() {
            Decimal::ZERO
        } else {
            ((last.close - first.open) / first.open * Decimal::ONE_HUNDRED).round_dp(2)
        };
        let closes: Vec<Decimal> = klines.iter().map(|k| k.close).collect();

        Some(Self {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            bars: klines.len(),
            start: first.open_time / 1000,
            end: last.close_time / 1000,
            open: first.open,
            high,
            low,
            close: last.close,
            change_pct,
            volume,
            sparkline: sparkline(&closes, SPARK_WIDTH),
        })
    }

    /// HTML block for Telegram
    pub fn render(&self, tz: Tz, price_precision: u32) -> String {
        let p = |d: Decimal| d.round_dp(price_precision).to_string();
        format!(
            "📈 <b>FUTURES - {} - {}</b> ({} bars)\n\
             <code>{}</code>\n\
             From {} to {}\n\
             O <b>{}</b> H <b>{}</b> L <b>{}</b> C <b>{}</b>\n\
             Change: <b>{}%</b>, volume: {}",
            self.symbol,
            self.interval,
            self.bars,
            self.sparkline,
            format_timestamp(self.start, tz),
            format_timestamp(self.end, tz),
            p(self.open),
            p(self.high),
            p(self.low),
            p(self.close),
            signed(self.change_pct),
            self.volume.round_dp(2),
        )
    }
}

/// `+1.5` / `-2` / `0`
pub fn signed(value: Decimal) -> String {
    if value > Decimal::ZERO {
        format!("+{}", value)
    } else {
        value.to_string()
    }
}

/// Block characters scaled between min and max, averaged into `width` buckets
pub fn sparkline(values: &[Decimal], width: usize) -> String {
    if values.is_empty() || width == 0 {
        return String::new();
    }

    let bucket = values.len().div_ceil(width);
    let points: Vec<Decimal> = values
        .chunks(bucket)
        .map(|chunk| chunk.iter().sum::<Decimal>() / Decimal::from(chunk.len()))
        .collect();

    let (Some(min), Some(max)) = (points.iter().min(), points.iter().max()) else {
        return String::new();
    };
    let span = *max - *min;
    let top = Decimal::from(SPARK_LEVELS.len() - 1);

    points
        .iter()
        .map(|v| {
            if span.is_zero() {
                return SPARK_LEVELS[SPARK_LEVELS.len() / 2];
            }
            let idx = ((*v - *min) / span * top).round().to_usize().unwrap_or(0);
            SPARK_LEVELS[idx.min(SPARK_LEVELS.len() - 1)]
        })
        .collect()
}
