//! HTML rendering of command replies

use super::command::COMMANDS;
use crate::client::types::{FuturesAccount, Position, Ticker24h, MARGIN_EPSILON};
use crate::error::Result;
use crate::executor::orders::OrderRequest;
use crate::monitor::{AlertBook, TrackedThread};
use crate::utils::{escape_html, format_timestamp, html_link, to_coin, QUOTE_ASSET};
use chrono_tz::Tz;
use rust_decimal::Decimal;

pub const SEPARATOR: &str = "---------------------";

pub fn futures_url(symbol: &str) -> String {
    format!("https://www.binance.com/en/futures/{}", symbol)
}

/// Percent change of `value` against `base`, two decimals
pub fn pct_from(value: Decimal, base: Decimal) -> Decimal {
    if base.is_zero() {
        return Decimal::ZERO;
    }
    ((value - base) / base * Decimal::ONE_HUNDRED).round_dp(2)
}

/// 24h ticker block
pub fn caption(ticker: &Ticker24h, price_precision: u32) -> String {
    let p = |d: Decimal| d.round_dp(price_precision);
    format!(
        "#{}: {}\n\
         ⚡ {:<8}<b>{}</b>\n\
         🕢 {:<8}<b>{}%</b>\n\
         📝 {:<8}<b>{}</b>\n\
         ⬆️ {:<8}<b>{} ({}%)</b>\n\
         ⬇️ {:<8}<b>{} ({}%)</b>\n",
        ticker.symbol,
        html_link(&futures_url(&ticker.symbol), "Link chart"),
        "Price",
        p(ticker.last_price),
        "24h",
        ticker.price_change_percent,
        "OPrice",
        p(ticker.open_price),
        "High",
        p(ticker.high_price),
        pct_from(ticker.high_price, ticker.open_price),
        "Low",
        p(ticker.low_price),
        pct_from(ticker.low_price, ticker.open_price),
    )
}

/// One spot asset valued in the quote asset
#[derive(Debug, Clone, PartialEq)]
pub struct SpotRow {
    pub asset: String,
    pub qty: Decimal,
    pub price: Decimal,
}

impl SpotRow {
    pub fn value(&self) -> Decimal {
        self.qty * self.price
    }
}

pub fn spot_info(rows: &[SpotRow]) -> String {
    let mut out = String::from("<b>SPOT Account</b>\n");
    for row in rows {
        if row.asset == QUOTE_ASSET {
            out.push_str(&format!("<b>{}: ${:.2}</b>\n", QUOTE_ASSET, row.qty));
            continue;
        }
        let url = format!(
            "https://www.binance.com/en/trade/{}_{}?type=spot",
            row.asset, QUOTE_ASSET
        );
        out.push_str(&format!(
            "{}: <b>${:.2}</b>, qty: {:.2}, price: {}\n",
            html_link(&url, &row.asset),
            row.value(),
            row.qty,
            row.price
        ));
    }
    let total: Decimal = rows.iter().map(SpotRow::value).sum();
    out.push_str(&format!("\n<b>Total balance: ${:.2}</b>", total));
    out
}

fn position_block(position: &Position) -> String {
    let side = if position.is_long() { "BUY" } else { "SHORT" };
    let mut block = format!(
        "{}: <b>{}</b> <b>{}x</b>, margin: <b>${}</b>\n\
         - entryPrice: <b>${}</b>, markPrice: <b>${}</b>\n\
         - PNL: <b>${:.2}</b>, ROI: <b>{}%</b>",
        html_link(&futures_url(&position.symbol), &position.symbol),
        side,
        position.leverage(),
        position.position_initial_margin,
        position.entry_price,
        position.mark_price,
        position.unrealized_profit,
        position.roi(),
    );
    if position.open_order_initial_margin > MARGIN_EPSILON {
        block.push_str(&format!(
            ", openMargin: <b>${}</b>",
            position.open_order_initial_margin
        ));
    }
    block.push_str(&format!(
        "\n- Close position: <code>/fclose {}</code>\n\n",
        to_coin(&position.symbol)
    ));
    block
}

/// Positions with margin (limit orders skipped) and account totals
pub fn futures_info(account: &FuturesAccount, positions: &[Position]) -> String {
    let mut out = String::from("<b>Futures Account</b>\n");
    for position in positions.iter().filter(|p| p.has_margin()) {
        out.push_str(&position_block(position));
    }
    out.push_str(&format!(
        "\n<b>Before Total Balance</b>: <b>${:.2}</b>\n\
         <b>Total Initial Margin</b>: <b>${:.2}</b> (Position: <b>${:.2}</b>, Open: <b>${:.2}</b>)\n\
         <b>Available Balance</b>: <b>${:.2}</b>\n\n\
         <b>Total Unrealized Profit</b>: <b>${:.2}</b>\n\
         <b>Total ROI</b>: <b>{}%</b>\n\
         <b>After Total Balance</b>: <b>${:.2}</b>",
        account.total_wallet_balance,
        account.total_initial_margin,
        account.total_position_initial_margin,
        account.total_open_order_initial_margin,
        account.available_balance,
        account.total_unrealized_profit,
        account.roi(),
        account.total_margin_balance,
    ));
    out
}

/// Alerts per symbol with the indices accepted by `/falert_remove`
pub fn alert_list(book: &AlertBook) -> String {
    let sections: Vec<String> = book
        .iter()
        .map(|(symbol, alerts)| {
            let mut section = format!("👉 <b>{}</b>\n", symbol);
            for (i, alert) in alerts.iter().enumerate() {
                section.push_str(&format!("{}. <b>{}</b>\n", i, escape_html(&alert.to_string())));
            }
            section
        })
        .collect();
    format!(
        "🔔 Here is your list alert:\n{}",
        sections.join(&format!("{}\n", SEPARATOR))
    )
}

pub fn replies_list(threads: &[(i64, TrackedThread)], tz: Tz) -> String {
    let mut out = String::from("🔔 Here is your list replies:\n");
    for (message_id, thread) in threads {
        out.push_str(&format!(
            "👉 <b>{}</b>: {} - Time: {}\n",
            message_id,
            html_link(&thread.url, &thread.url),
            format_timestamp(thread.max_timestamp, tz)
        ));
    }
    out
}

/// Title line followed by the orders as pretty JSON
pub fn orders_summary(title: &str, orders: &[OrderRequest]) -> Result<String> {
    let json = serde_json::to_string_pretty(orders)?;
    Ok(format!("👋 {}\n<pre>{}</pre>", escape_html(title), escape_html(&json)))
}

pub fn help_text() -> String {
    let mut out = String::from("<b>Commands</b>\n");
    for (name, description) in COMMANDS {
        out.push_str(&format!("/{} - {}\n", name, escape_html(description)));
    }
    out
}
