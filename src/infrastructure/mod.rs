//! Adapters implementing the `domain::ports` traits against real I/O:
//! the broker wire protocol, SQLite persistence, rate-limited HTTP clients,
//! the notifier transport, the external time source, and observability.

pub mod broker;
pub mod clock;
pub mod external;
pub mod historical_cache;
pub mod notifier;
pub mod observability;
pub mod persistence;
pub mod time_source;
