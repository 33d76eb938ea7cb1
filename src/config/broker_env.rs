//! Broker connection parameters, parsed from the environment (§4.2, §6).

use crate::domain::config::BrokerConfig;
use anyhow::{Context, Result};
use std::env;

pub struct BrokerEnvConfig;

impl BrokerEnvConfig {
    pub fn from_env() -> Result<BrokerConfig> {
        let host = env::var("IBKR_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("IBKR_PORT")
            .unwrap_or_else(|_| "7497".to_string())
            .parse()
            .context("IBKR_PORT must be a u16")?;
        let client_id: i32 = env::var("IBKR_CLIENT_ID")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .context("IBKR_CLIENT_ID must be an i32")?;
        let connect_timeout_secs: u64 = env::var("IBKR_CONNECT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("IBKR_CONNECT_TIMEOUT_SECS must be a u64")?;
        let max_connect_attempts: u32 = env::var("IBKR_MAX_CONNECT_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .context("IBKR_MAX_CONNECT_ATTEMPTS must be a u32")?;
        let market_data_type: u8 = env::var("IBKR_MARKET_DATA_TYPE")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .context("IBKR_MARKET_DATA_TYPE must be a u8")?;

        Ok(BrokerConfig::new(
            host,
            port,
            client_id,
            connect_timeout_secs,
            max_connect_attempts,
            market_data_type,
        )?)
    }
}
