// Configuration value objects (validated at construction)
pub mod config;

// Market regime, feature-vector and calendar domain
pub mod market;

// Pricing and Greeks: analytical/binomial Vanna, cached risk-free rate
pub mod pricing;

// Port interfaces: broker adapter, store, external clients, notifier, clock
pub mod ports;

// Risk gate chain: circuit breaker, VIX, blackouts, liquidity, Greeks,
// portfolio beta exposure, AI sanity check (§4.10)
pub mod risk;

// Strategy construction (§4.9): verticals, iron condor/butterfly, calendar,
// and position sizing
pub mod strategy;

// Core data model: positions, legs, trades, quotes, candidates
pub mod types;

// Domain-specific error types
pub mod errors;

// Data-quality validation helpers shared by the screener and sanity checker
pub mod validation;
