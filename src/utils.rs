//! Small helpers shared across modules

use chrono::{TimeZone, Utc};
use chrono_tz::Tz;

pub const QUOTE_ASSET: &str = "USDT";

/// Keywords that mark a post as a trade call
const TRADE_KEYWORDS: &[&str] = &["short", "long", "buy", "sell", "leverage", "sl"];

pub fn is_trade_call(text: &str) -> bool {
    let lower = text.to_lowercase();
    TRADE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Parse `15m`, `4h`, `1M`... into seconds
pub fn duration_to_secs(value: &str) -> Option<i64> {
    let value = value.trim();
    let unit = value.chars().last()?;
    let amount: i64 = value[..value.len() - unit.len_utf8()].parse().ok()?;
    if amount <= 0 {
        return None;
    }
    let factor = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 604_800,
        'M' => 2_592_000,
        'y' => 31_536_000,
        _ => return None,
    };
    amount.checked_mul(factor)
}

/// Futures symbol quoted in USDT, `btc` -> `BTCUSDT`
pub fn to_symbol(coin: &str) -> String {
    let upper = coin.trim().to_uppercase();
    if upper.ends_with(QUOTE_ASSET) && upper.len() > QUOTE_ASSET.len() {
        upper
    } else {
        format!("{}{}", upper, QUOTE_ASSET)
    }
}

/// `BTCUSDT` -> `BTC`
pub fn to_coin(symbol: &str) -> &str {
    symbol.strip_suffix(QUOTE_ASSET).unwrap_or(symbol)
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Unix seconds rendered in the configured zone
pub fn format_timestamp(ts: i64, tz: Tz) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S%:z").to_string(),
        None => ts.to_string(),
    }
}

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// `<a href="url">label</a>` with both parts escaped
pub fn html_link(url: &str, label: &str) -> String {
    format!("<a href=\"{}\">{}</a>", escape_html(url), escape_html(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_call_keywords() {
        assert!(is_trade_call("LONG BTC now"));
        assert!(is_trade_call("set SL at 60k"));
        assert!(is_trade_call("Buying the dip"));
        assert!(!is_trade_call("gm everyone"));
    }

    #[test]
    fn test_duration_units() {
        assert_eq!(duration_to_secs("30s"), Some(30));
        assert_eq!(duration_to_secs("15m"), Some(900));
        assert_eq!(duration_to_secs("4h"), Some(14_400));
        assert_eq!(duration_to_secs("1d"), Some(86_400));
        assert_eq!(duration_to_secs("1w"), Some(604_800));
        assert_eq!(duration_to_secs("1M"), Some(2_592_000));
        assert_eq!(duration_to_secs("1y"), Some(31_536_000));
    }

    #[test]
    fn test_duration_rejects_garbage() {
        assert_eq!(duration_to_secs(""), None);
        assert_eq!(duration_to_secs("m"), None);
        assert_eq!(duration_to_secs("15x"), None);
        assert_eq!(duration_to_secs("0m"), None);
        assert_eq!(duration_to_secs("-5m"), None);
    }

    #[test]
    fn test_symbol_conversion() {
        assert_eq!(to_symbol("btc"), "BTCUSDT");
        assert_eq!(to_symbol("ethusdt"), "ETHUSDT");
        assert_eq!(to_symbol("usdt"), "USDTUSDT");
        assert_eq!(to_coin("SOLUSDT"), "SOL");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn test_format_timestamp_in_zone() {
        let tz: Tz = "Asia/Ho_Chi_Minh".parse().unwrap();
        assert_eq!(format_timestamp(0, tz), "1970-01-01 07:00:00+07:00");
    }

    #[test]
    fn test_html_link() {
        assert_eq!(
            html_link("https://x.com/a?b=1&c=2", "x"),
            "<a href=\"https://x.com/a?b=1&amp;c=2\">x</a>"
        );
    }
}
