//! Unit tests for kline summaries

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::client::types::Kline;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn kline(open_time: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Kline {
        Kline {
            open_time,
            open,
            high,
            low,
            close,
            volume: dec!(10),
            close_time: open_time + 899_999,
        }
    }

    #[test]
    fn test_default_window() {
        let window = resolve_window(None, None);
        assert_eq!(window.interval, "15m");
        assert_eq!(window.range_secs, 21 * 900);
    }

    #[test]
    fn test_invalid_interval_falls_back() {
        let window = resolve_window(Some("7m"), None);
        assert_eq!(window.interval, DEFAULT_INTERVAL);
        assert_eq!(window.range_secs, 18_900);
    }

    #[test]
    fn test_custom_range() {
        let window = resolve_window(Some("1h"), Some("1d"));
        assert_eq!(window.interval, "1h");
        assert_eq!(window.range_secs, 86_400);

        let window = resolve_window(Some("4h"), Some("soon"));
        assert_eq!(window.range_secs, 21 * 14_400);
    }

    #[test]
    fn test_window_bounds() {
        let window = resolve_window(Some("1m"), Some("10m"));
        assert_eq!(window.bounds_ms(1_000), (400_000, 1_000_000));
    }

    #[test]
    fn test_huge_range_capped() {
        let window = resolve_window(Some("15m"), Some("290000000000y"));
        assert_eq!(window.range_secs, 900 * MAX_BARS);
        assert_eq!(
            window.bounds_ms(1_700_000_000),
            (1_673_000_000_000, 1_700_000_000_000)
        );

        let window = KlineWindow {
            interval: "1m".to_string(),
            range_secs: i64::MAX,
        };
        assert_eq!(window.bounds_ms(1_000), (i64::MIN, 1_000_000));
    }

    #[test]
    fn test_summary_from_klines() {
        let klines = vec![
            kline(0, dec!(100), dec!(110), dec!(95), dec!(105)),
            kline(900_000, dec!(105), dec!(120), dec!(100), dec!(118)),
            kline(1_800_000, dec!(118), dec!(119), dec!(90), dec!(110)),
        ];
        let summary = KlineSummary::from_klines("BTCUSDT", "15m", &klines).unwrap();

        assert_eq!(summary.bars, 3);
        assert_eq!(summary.open, dec!(100));
        assert_eq!(summary.close, dec!(110));
        assert_eq!(summary.high, dec!(120));
        assert_eq!(summary.low, dec!(90));
        assert_eq!(summary.change_pct, dec!(10));
        assert_eq!(summary.volume, dec!(30));
        assert_eq!(summary.start, 0);
        assert_eq!(summary.end, 2_699);
        assert_eq!(summary.sparkline.chars().count(), 3);
    }

    #[test]
    fn test_summary_empty() {
        assert!(KlineSummary::from_klines("BTCUSDT", "15m", &[]).is_none());
    }

    #[test]
    fn test_render_contains_prices() {
        let klines = vec![kline(0, dec!(2.5), dec!(3), dec!(2), dec!(2.25))];
        let summary = KlineSummary::from_klines("ETHUSDT", "1h", &klines).unwrap();
        let text = summary.render(chrono_tz::Tz::UTC, 2);

        assert!(text.contains("FUTURES - ETHUSDT - 1h"));
        assert!(text.contains("O <b>2.5</b> H <b>3</b> L <b>2</b> C <b>2.25</b>"));
        assert!(text.contains("Change: <b>-10"));
        assert!(text.contains("1970-01-01 00:00:00+00:00"));
    }

    #[test]
    fn test_signed() {
        assert_eq!(signed(dec!(1.5)), "+1.5");
        assert_eq!(signed(dec!(-2)), "-2");
        assert_eq!(signed(Decimal::ZERO), "0");
    }

    #[test]
    fn test_sparkline_levels() {
        let values: Vec<Decimal> = (1..=8).map(Decimal::from).collect();
        let line = sparkline(&values, 8);
        assert_eq!(line, "▁▂▃▄▅▆▇█");
    }

    #[test]
    fn test_sparkline_downsamples_and_flat() {
        let values: Vec<Decimal> = (0..100).map(Decimal::from).collect();
        assert_eq!(sparkline(&values, 40).chars().count(), 34);

        let flat = sparkline(&[dec!(5); 4], 10);
        assert_eq!(flat, "▅▅▅▅");
        assert_eq!(sparkline(&[], 10), "");
    }
}
