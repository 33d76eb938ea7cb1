//! Gate 2: VIX gate. Blocks all credit strategies in a panic VIX regime, and
//! blocks short-vega strategies when the term structure is in backwardation.

use crate::domain::errors::RiskGateError;
use crate::domain::types::{StrategyKind, TermStructure};
use rust_decimal::Decimal;

pub fn check(
    strategy: StrategyKind,
    vix: Decimal,
    panic_threshold: Decimal,
    term_structure: TermStructure,
) -> Result<(), RiskGateError> {
    if strategy.is_credit() && vix >= panic_threshold {
        return Err(RiskGateError::VixGate {
            reason: format!("VIX {vix} >= panic threshold {panic_threshold}, credit strategies blocked"),
        });
    }
    if strategy.is_short_vega() && term_structure == TermStructure::Backwardation {
        return Err(RiskGateError::VixGate {
            reason: "term structure in backwardation, short-vega strategies blocked".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn blocks_credit_strategy_at_panic_vix() {
        let err = check(StrategyKind::IronCondor, dec!(32), dec!(30), TermStructure::Contango);
        assert!(err.is_err());
    }

    #[test]
    fn allows_credit_strategy_below_panic_vix() {
        assert!(check(StrategyKind::IronCondor, dec!(18.5), dec!(30), TermStructure::Contango).is_ok());
    }

    #[test]
    fn blocks_short_vega_in_backwardation() {
        let err = check(StrategyKind::VerticalCreditCall, dec!(18), dec!(30), TermStructure::Backwardation);
        assert!(err.is_err());
    }

    #[test]
    fn debit_strategy_unaffected_by_backwardation() {
        assert!(check(StrategyKind::VerticalDebitCall, dec!(18), dec!(30), TermStructure::Backwardation).is_ok());
    }
}
