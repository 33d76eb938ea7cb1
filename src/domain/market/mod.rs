//! Market regime and feature-vector domain (§4.7 Regime & Feature Engine),
//! plus the market calendar (§4.1).

pub mod calendar;
pub mod features;
pub mod regime_classifier;

pub use calendar::MarketCalendar;
pub use features::FeatureVector;
pub use regime_classifier::{preferred_strategies, Classifier, RegimeModel};
