//! §4.6 Pricing & Greeks: Vanna (analytical and American-binomial), and a
//! cached risk-free rate sourced from the broker's Treasury yield.

pub mod greeks;
pub mod risk_free_rate;

pub use greeks::{GreeksCalculator, OptionStyle};
pub use risk_free_rate::RiskFreeRateCache;
