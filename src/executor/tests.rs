//! Unit tests for order construction and execution

#[cfg(test)]
mod tests {
    use super::super::orders::*;
    use super::super::*;
    use crate::client::types::{LeverageAck, Position, PositionSetting, UserTrade};
    use crate::client::MockExchangeApi;
    use rust_decimal_macros::dec;

    fn position(symbol: &str, amount: Decimal) -> Position {
        Position {
            symbol: symbol.to_string(),
            position_amt: amount,
            entry_price: dec!(60000),
            mark_price: dec!(61000),
            unrealized_profit: dec!(10),
            notional: dec!(610),
            position_initial_margin: dec!(30.5),
            open_order_initial_margin: Decimal::ZERO,
        }
    }

    fn ack(order_id: i64, side: &str) -> OrderAck {
        OrderAck {
            order_id,
            symbol: "BTCUSDT".to_string(),
            status: "NEW".to_string(),
            side: side.to_string(),
            order_type: "MARKET".to_string(),
            orig_qty: dec!(0.003),
            price: Decimal::ZERO,
            avg_price: Decimal::ZERO,
        }
    }

    #[test]
    fn test_side_from_arg() {
        assert_eq!(Side::from_arg("b"), Side::Buy);
        assert_eq!(Side::from_arg("BUY"), Side::Buy);
        assert_eq!(Side::from_arg("s"), Side::Sell);
        assert_eq!(Side::from_arg("short"), Side::Sell);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn test_quantity_rounds_to_precision() {
        let qty = quantity(dec!(10), 20, dec!(65000), 3).unwrap();
        assert_eq!(qty, dec!(0.003));
        let qty = quantity(dec!(50), 10, dec!(0.25), 0).unwrap();
        assert_eq!(qty, dec!(2000));
    }

    #[test]
    fn test_quantity_rejects_bad_input() {
        assert!(quantity(dec!(10), 20, Decimal::ZERO, 3).is_err());
        assert!(quantity(dec!(1), 1, dec!(65000), 3).is_err());
    }

    #[test]
    fn test_market_batch_with_exits() {
        let orders = market_batch(Side::Buy, "BTCUSDT", dec!(0.003), Some(dec!(60000)), Some(dec!(70000)));
        assert_eq!(orders.len(), 3);

        assert_eq!(orders[0].order_type, OrderType::Market);
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[0].quantity, Some(dec!(0.003)));
        assert!(!orders[0].close_position);

        assert_eq!(orders[1].order_type, OrderType::StopMarket);
        assert_eq!(orders[1].side, Side::Sell);
        assert_eq!(orders[1].stop_price, Some(dec!(60000)));
        assert!(orders[1].close_position);

        assert_eq!(orders[2].order_type, OrderType::TakeProfitMarket);
        assert_eq!(orders[2].side, Side::Sell);
    }

    #[test]
    fn test_order_json_layout() {
        let orders = market_batch(Side::Sell, "ETHUSDT", dec!(0.5), Some(dec!(3500)), None);
        let json = serde_json::to_value(&orders).unwrap();
        assert_eq!(json[0]["type"], "MARKET");
        assert_eq!(json[0]["side"], "SELL");
        assert_eq!(json[0]["quantity"], "0.5");
        assert!(json[0].get("closePosition").is_none());
        assert_eq!(json[1]["type"], "STOP_MARKET");
        assert_eq!(json[1]["side"], "BUY");
        assert_eq!(json[1]["stopPrice"], "3500");
        assert_eq!(json[1]["closePosition"], "true");
        assert!(json[1].get("quantity").is_none());
    }

    #[test]
    fn test_limit_order_params() {
        let order = limit_order(Side::Buy, "BTCUSDT", dec!(0.01), dec!(58000.5));
        let params = order.to_params();
        assert!(params.contains(&("type", "LIMIT".to_string())));
        assert!(params.contains(&("timeInForce", "GTC".to_string())));
        assert!(params.contains(&("price", "58000.5".to_string())));
        assert!(params.contains(&("quantity", "0.01".to_string())));
    }

    #[test]
    fn test_close_orders_take_opposite_side() {
        let positions = vec![position("BTCUSDT", dec!(-0.02)), position("BTCUSDT", Decimal::ZERO)];
        let orders = close_orders("BTCUSDT", &positions);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[0].order_type, OrderType::Market);
        assert_eq!(orders[0].quantity, Some(dec!(0.02)));
    }

    #[test]
    fn test_tp_sl_orders_for_long() {
        let positions = vec![position("BTCUSDT", dec!(0.01))];
        let orders = tp_sl_orders("BTCUSDT", &positions, None, Some(dec!(75000)));
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_type, OrderType::TakeProfitMarket);
        assert_eq!(orders[0].side, Side::Sell);
        assert!(orders[0].close_position);
    }

    #[tokio::test]
    async fn test_market_order_adjusts_leverage_only() {
        let mut exchange = MockExchangeApi::new();
        exchange.expect_position_settings().returning(|symbol| {
            Ok(vec![PositionSetting {
                symbol: symbol.to_string(),
                leverage: dec!(10),
                margin_type: "cross".to_string(),
            }])
        });
        exchange
            .expect_change_leverage()
            .withf(|symbol, leverage| symbol.to_string() == "BTCUSDT" && *leverage == 20)
            .times(1)
            .returning(|symbol, leverage| {
                Ok(LeverageAck {
                    symbol: symbol.to_string(),
                    leverage,
                })
            });
        exchange.expect_change_margin_type().times(0);
        exchange.expect_futures_price().returning(|_| Ok(dec!(65000)));
        exchange.expect_symbol_info().returning(|_| Ok(None));
        exchange
            .expect_place_batch()
            .withf(|orders| orders.len() == 2 && orders[0].quantity == Some(dec!(0.003)))
            .returning(|_| {
                Ok(vec![
                    BatchResult::Placed(ack(1, "BUY")),
                    BatchResult::Failed {
                        code: -2021,
                        msg: "Order would immediately trigger.".to_string(),
                    },
                ])
            });

        let executor = Executor::new(Arc::new(exchange));
        let report = executor
            .market_order(Side::Buy, "BTCUSDT", 20, dec!(10), Some(dec!(66000)), None)
            .await
            .unwrap();

        assert!(!report.is_ok());
        assert_eq!(report.placed.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].code, -2021);
        assert_eq!(report.failures[0].order.order_type, OrderType::StopMarket);
    }

    #[tokio::test]
    async fn test_prepare_symbol_switches_to_cross() {
        let mut exchange = MockExchangeApi::new();
        exchange.expect_position_settings().returning(|symbol| {
            Ok(vec![PositionSetting {
                symbol: symbol.to_string(),
                leverage: dec!(5),
                margin_type: "isolated".to_string(),
            }])
        });
        exchange.expect_change_leverage().times(0);
        exchange
            .expect_change_margin_type()
            .withf(|_, margin_type| margin_type.to_string() == "CROSSED")
            .times(1)
            .returning(|_, _| Ok(()));

        let executor = Executor::new(Arc::new(exchange));
        executor.prepare_symbol("ETHUSDT", 5).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_position_sums_realized_pnl() {
        let mut exchange = MockExchangeApi::new();
        exchange
            .expect_cancel_all_open_orders()
            .times(1)
            .returning(|_| Ok(()));
        exchange
            .expect_symbol_positions()
            .returning(|_| Ok(vec![position("BTCUSDT", dec!(-0.003))]));
        exchange
            .expect_place_batch()
            .withf(|orders| orders.len() == 1 && orders[0].side == Side::Buy)
            .returning(|_| Ok(vec![BatchResult::Placed(ack(7, "BUY"))]));
        exchange
            .expect_user_trades()
            .withf(|_, order_id| *order_id == 7)
            .returning(|symbol, order_id| {
                let trade = |pnl: Decimal| UserTrade {
                    symbol: symbol.to_string(),
                    order_id,
                    side: "BUY".to_string(),
                    price: dec!(61000),
                    qty: dec!(0.0015),
                    realized_pnl: pnl,
                    commission: dec!(0.01),
                    time: 0,
                };
                Ok(vec![trade(dec!(1.5)), trade(dec!(2.25))])
            });

        let executor = Executor::new(Arc::new(exchange));
        let report = executor.close_position("BTCUSDT").await.unwrap();
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].order_id, 7);
        assert_eq!(report.total_pnl(), dec!(3.75));
    }

    #[tokio::test]
    async fn test_tp_sl_without_positions_places_nothing() {
        let mut exchange = MockExchangeApi::new();
        exchange.expect_symbol_positions().returning(|_| Ok(vec![]));
        exchange.expect_place_batch().times(0);

        let executor = Executor::new(Arc::new(exchange));
        let report = executor
            .set_tp_sl("BTCUSDT", Some(dec!(1)), None)
            .await
            .unwrap();
        assert!(report.orders.is_empty());
    }
}
