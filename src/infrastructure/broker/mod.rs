//! §4.4 Broker Adapter implementation over a framed TCP session.

pub mod adapter;
pub mod pacing;
pub mod wire;

pub use adapter::IbkrBrokerAdapter;
