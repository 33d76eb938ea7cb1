//! §4.12 Position Tracker: refreshes per-leg market value from the broker's
//! portfolio snapshot and re-aggregates the Position's fair value.

use crate::domain::errors::BrokerError;
use crate::domain::ports::BrokerAdapter;
use crate::domain::types::Position;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub struct PositionTracker {
    broker: Arc<dyn BrokerAdapter>,
}

impl PositionTracker {
    pub fn new(broker: Arc<dyn BrokerAdapter>) -> Self {
        Self { broker }
    }

    /// `current_price_per_contract = -sum(leg_market_values) / (contracts * 100)`,
    /// the sign chosen so a credit spread's close-debit reads positive.
    pub async fn refresh_price(&self, position: &Position) -> Result<Decimal, BrokerError> {
        let portfolio = self.broker.portfolio().await?;
        let mut total = Decimal::ZERO;
        for leg in &position.legs {
            let market_value = portfolio
                .iter()
                .find(|p| p.con_id == leg.con_id)
                .map(|p| p.market_value)
                .ok_or_else(|| BrokerError::Protocol(format!("leg con_id {} for position {} missing from broker portfolio", leg.con_id, position.id)))?;
            total += market_value;
        }
        let contracts = Decimal::from(position.contracts.max(1));
        Ok(-total / (contracts * dec!(100)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::BrokerError as BErr;
    use crate::domain::ports::{Candle, ComboLeg, ComboOrder, PortfolioPosition, TradeHandle};
    use crate::domain::types::{Action, Leg, OptionRight, Position, PositionStatus, Regime, StrategyKind};
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    struct FakeBroker {
        legs: Vec<PortfolioPosition>,
    }

    #[async_trait]
    impl BrokerAdapter for FakeBroker {
        async fn connect(&self) -> Result<(), BErr> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), BErr> {
            Ok(())
        }
        async fn ensure_connected(&self) -> Result<(), BErr> {
            Ok(())
        }
        async fn account_summary(&self) -> Result<crate::domain::types::AccountSummary, BErr> {
            unimplemented!()
        }
        async fn qualify(&self, _symbol: &str) -> Result<i64, BErr> {
            unimplemented!()
        }
        async fn snapshot_option(&self, _con_id: i64, _allow_delayed_data: bool) -> Result<crate::domain::types::OptionQuote, BErr> {
            unimplemented!()
        }
        async fn place_combo(&self, _legs: &[ComboLeg], _order: ComboOrder) -> Result<TradeHandle, BErr> {
            unimplemented!()
        }
        async fn cancel_order(&self, _order_id: &str) -> Result<(), BErr> {
            Ok(())
        }
        async fn open_orders(&self) -> Result<Vec<TradeHandle>, BErr> {
            Ok(vec![])
        }
        async fn portfolio(&self) -> Result<Vec<PortfolioPosition>, BErr> {
            Ok(self.legs.clone())
        }
        async fn historical_bars(&self, _symbol: &str, _duration_days: u32, _bar_size: &str) -> Result<Vec<Candle>, BErr> {
            Ok(vec![])
        }
        async fn fundamental_xml(&self, _symbol: &str, _report: &str) -> Result<String, BErr> {
            Ok(String::new())
        }
        async fn risk_free_rate(&self) -> Result<Decimal, BErr> {
            Ok(dec!(0.045))
        }
        async fn scan(&self, _code: &str, _min_price: Decimal, _max_price: Decimal) -> Result<Vec<String>, BErr> {
            Ok(vec![])
        }
    }

    fn sample_position() -> Position {
        Position {
            id: Uuid::new_v4(),
            symbol: "SPY".to_string(),
            strategy: StrategyKind::VerticalCreditCall,
            entry_ts: Utc::now(),
            expiration: NaiveDate::from_ymd_opt(2026, 9, 18).unwrap(),
            contracts: 1,
            entry_credit: dec!(0.625),
            max_risk: dec!(437.5),
            status: PositionStatus::Open,
            exit_ts: None,
            exit_price: None,
            exit_reason: None,
            realized_pnl: None,
            vix_entry: dec!(18.5),
            regime_entry: Regime::LowVolNeutral,
            legs: vec![
                Leg { position_id: Uuid::new_v4(), contract_symbol: "SPY 20260918 455 C".into(), action: Action::Sell, strike: dec!(455), option_type: OptionRight::Call, quantity: 1, entry_price: dec!(1.125), con_id: 1 },
                Leg { position_id: Uuid::new_v4(), contract_symbol: "SPY 20260918 460 C".into(), action: Action::Buy, strike: dec!(460), option_type: OptionRight::Call, quantity: 1, entry_price: dec!(0.50), con_id: 2 },
            ],
            trailing_stop: dec!(1.5625),
            trailing_profit: dec!(0.3125),
            highest_profit_seen: Decimal::ZERO,
            stop_multiplier: dec!(2.5),
            profit_target_pct: dec!(0.5),
            ml_confidence: None,
            ml_last_update: None,
        }
    }

    #[tokio::test]
    async fn refresh_price_sums_and_negates_leg_market_values() {
        let broker = FakeBroker {
            legs: vec![
                PortfolioPosition { symbol: "SPY".into(), con_id: 1, strike: dec!(455), right: OptionRight::Call, expiration: NaiveDate::from_ymd_opt(2026, 9, 18).unwrap(), quantity: -1, market_value: dec!(-50.0), average_cost: dec!(112.5) },
                PortfolioPosition { symbol: "SPY".into(), con_id: 2, strike: dec!(460), right: OptionRight::Call, expiration: NaiveDate::from_ymd_opt(2026, 9, 18).unwrap(), quantity: 1, market_value: dec!(20.0), average_cost: dec!(50.0) },
            ],
        };
        let tracker = PositionTracker::new(Arc::new(broker));
        let price = tracker.refresh_price(&sample_position()).await.unwrap();
        // -(-50 + 20) / (1*100) = 0.30
        assert_eq!(price, dec!(0.30));
    }

    #[tokio::test]
    async fn missing_leg_in_portfolio_is_an_error() {
        let broker = FakeBroker { legs: vec![] };
        let tracker = PositionTracker::new(Arc::new(broker));
        assert!(tracker.refresh_price(&sample_position()).await.is_err());
    }
}
