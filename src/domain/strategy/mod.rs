//! §4.9 Strategy Builder: constructs candidate multi-leg structures from an
//! already-fetched option chain and sizes them against available funds.

pub mod builder;
pub mod sizing;

pub use builder::{build_calendar, build_iron_butterfly, build_iron_condor, build_vertical_credit, BuiltStrategy, ProposedLeg};
pub use sizing::size_position;
