//! Regime classification: a pluggable `Classifier` capability with
//! `{Ml(model), RuleBased}` variants chosen once at construction. Callers
//! never branch on which variant they got — only on the returned `Regime`
//! and its `ClassifierMode` tag (kept for observability).

use crate::domain::market::features::FeatureVector;
use crate::domain::types::{ClassifierMode, Regime, StrategyKind};

/// A trained model's prediction surface. Infrastructure adapters implement
/// this against whatever runtime backs the model; the domain only needs the
/// prediction itself.
pub trait RegimeModel: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Regime;
}

pub enum Classifier {
    Ml(Box<dyn RegimeModel>),
    RuleBased,
}

impl Classifier {
    pub fn classify(&self, features: &FeatureVector) -> (Regime, ClassifierMode) {
        match self {
            Classifier::Ml(model) => (model.predict(features), ClassifierMode::Ml),
            Classifier::RuleBased => (classify_rule_based(features), ClassifierMode::RuleBased),
        }
    }
}

/// Deterministic fallback applied when no trained model is present.
fn classify_rule_based(f: &FeatureVector) -> Regime {
    if f.vix > 30.0 {
        return Regime::ExtremeStress;
    }
    if (15.0..=30.0).contains(&f.vix) && f.return_20d < -0.05 {
        return Regime::BearTrending;
    }
    if f.vix > 20.0 && f.return_20d.abs() < 0.05 {
        return Regime::HighVolNeutral;
    }
    if f.vix < 15.0 && f.return_20d > 0.03 && f.price_above_sma50 {
        return Regime::BullTrending;
    }
    Regime::LowVolNeutral
}

/// §4.7 `PreferredStrategies(regime)`. `panic_vix` gates the PANIC override:
/// when current VIX exceeds the panic threshold, no strategy is preferred
/// regardless of the classified regime.
pub fn preferred_strategies(regime: Regime, vix: f64, panic_threshold: f64) -> Vec<StrategyKind> {
    if vix > panic_threshold {
        return Vec::new();
    }
    match regime {
        Regime::ExtremeStress | Regime::HighVolNeutral => {
            vec![StrategyKind::IronCondor, StrategyKind::VerticalCreditCall, StrategyKind::VerticalCreditPut]
        }
        Regime::BullTrending | Regime::BearTrending => {
            vec![StrategyKind::VerticalCreditCall, StrategyKind::VerticalCreditPut]
        }
        Regime::LowVolNeutral => vec![StrategyKind::VerticalDebitCall, StrategyKind::VerticalDebitPut, StrategyKind::Calendar],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(vix: f64, return_20d: f64, above_sma50: bool) -> FeatureVector {
        FeatureVector {
            vix,
            return_20d,
            price_above_sma50: above_sma50,
            ..Default::default()
        }
    }

    #[test]
    fn extreme_vix_always_wins() {
        let f = features(31.0, 0.10, true);
        assert_eq!(classify_rule_based(&f), Regime::ExtremeStress);
    }

    #[test]
    fn bear_trending_on_elevated_vix_and_negative_return() {
        let f = features(22.0, -0.08, false);
        assert_eq!(classify_rule_based(&f), Regime::BearTrending);
    }

    #[test]
    fn high_vol_neutral_on_flat_return() {
        let f = features(25.0, 0.01, false);
        assert_eq!(classify_rule_based(&f), Regime::HighVolNeutral);
    }

    #[test]
    fn bull_trending_needs_all_three_conditions() {
        let f = features(10.0, 0.05, true);
        assert_eq!(classify_rule_based(&f), Regime::BullTrending);

        let f_no_sma = features(10.0, 0.05, false);
        assert_eq!(classify_rule_based(&f_no_sma), Regime::LowVolNeutral);
    }

    #[test]
    fn panic_threshold_empties_preferred_strategies() {
        let strategies = preferred_strategies(Regime::BullTrending, 35.0, 30.0);
        assert!(strategies.is_empty());
    }

    #[test]
    fn extreme_stress_prefers_iron_condor() {
        let strategies = preferred_strategies(Regime::ExtremeStress, 31.0, 35.0);
        assert!(strategies.contains(&StrategyKind::IronCondor));
    }
}
