//! §4.2 Config: a validated, immutable snapshot of every tunable the
//! trading engine consults. Loading is split into per-domain env-config
//! structs (broker/trading/risk/external/observability), each of which
//! composes down into the matching `domain::config` value object so a bad
//! field fails fast with a precise message instead of a generic "config
//! invalid" at first use. A reload (`Config::from_env`) builds a brand-new
//! snapshot rather than mutating one in place.

mod broker_env;
mod external_env;
mod observability_env;
mod risk_env;
mod trading_env;

pub use external_env::ExternalClientEnvConfig;
pub use observability_env::ObservabilityEnvConfig;
pub use trading_env::TradingEnvConfig;

use crate::domain::config::{BrokerConfig, RiskConfig, StrategyConfig};
use anyhow::Result;

/// The full, validated configuration snapshot threaded through every
/// component constructor at startup (§9: no process-wide mutable
/// references — components hold an `Arc<Config>` or just the sub-config
/// slice they need).
#[derive(Debug, Clone)]
pub struct Config {
    pub broker: BrokerConfig,
    pub risk: RiskConfig,
    pub strategy: StrategyConfig,
    pub trading: TradingEnvConfig,
    pub external: ExternalClientEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    /// Loads and validates every sub-config from the environment. Fails
    /// fast (`ErrConfigInvalid`, §7) on the first invalid field.
    pub fn from_env() -> Result<Self> {
        let broker = broker_env::BrokerEnvConfig::from_env()?;
        let risk = risk_env::RiskEnvConfig::from_env()?;
        let trading = trading_env::TradingEnvConfig::from_env()?;
        let strategy = trading.strategy_config()?;
        let external = external_env::ExternalClientEnvConfig::from_env()?;
        let observability = observability_env::ObservabilityEnvConfig::from_env()?;

        Ok(Self {
            broker,
            risk,
            strategy,
            trading,
            external,
            observability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_succeeds_with_no_environment_overrides() {
        // Every sub-config ships a sane default, so a bare environment
        // (as in CI) must still produce a valid snapshot.
        let cfg = Config::from_env();
        assert!(cfg.is_ok(), "{:?}", cfg.err());
    }
}
