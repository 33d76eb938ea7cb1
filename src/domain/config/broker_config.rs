//! Broker Configuration Domain Value Object
//!
//! Connection parameters for the TWS/Gateway-style broker session.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BrokerConfigError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("invalid port: {0}")]
    InvalidPort(u16),

    #[error("connect_timeout_secs must be > 0")]
    InvalidTimeout,

    #[error("max_connect_attempts must be > 0")]
    InvalidAttempts,
}

/// Broker connection configuration, validated once at startup.
///
/// # Invariants
/// - `host` non-empty, `port` non-zero
/// - `connect_timeout_secs` and `max_connect_attempts` > 0
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: i32,
    pub connect_timeout_secs: u64,
    pub max_connect_attempts: u32,
    pub market_data_type: u8,
}

impl BrokerConfig {
    pub fn new(
        host: String,
        port: u16,
        client_id: i32,
        connect_timeout_secs: u64,
        max_connect_attempts: u32,
        market_data_type: u8,
    ) -> Result<Self, BrokerConfigError> {
        let config = Self {
            host,
            port,
            client_id,
            connect_timeout_secs,
            max_connect_attempts,
            market_data_type,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), BrokerConfigError> {
        if self.host.is_empty() {
            return Err(BrokerConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(BrokerConfigError::InvalidPort(self.port));
        }
        if self.connect_timeout_secs == 0 {
            return Err(BrokerConfigError::InvalidTimeout);
        }
        if self.max_connect_attempts == 0 {
            return Err(BrokerConfigError::InvalidAttempts);
        }
        Ok(())
    }

    /// Paper-trading loopback default, for tests and the mock adapter.
    pub fn paper_default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7497,
            client_id: 1,
            connect_timeout_secs: 10,
            max_connect_attempts: 3,
            market_data_type: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_host() {
        let err = BrokerConfig::new(String::new(), 7497, 1, 10, 3, 1).unwrap_err();
        assert_eq!(err, BrokerConfigError::EmptyHost);
    }

    #[test]
    fn rejects_zero_port() {
        let err = BrokerConfig::new("127.0.0.1".into(), 0, 1, 10, 3, 1).unwrap_err();
        assert_eq!(err, BrokerConfigError::InvalidPort(0));
    }

    #[test]
    fn paper_default_is_valid() {
        let cfg = BrokerConfig::paper_default();
        assert_eq!(cfg.market_data_type, 1);
    }
}
