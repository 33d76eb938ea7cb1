//! Data-quality predicates shared across the pipeline, kept separate from
//! the ordered risk-gate chain in `domain::risk` because these checks are
//! "is this input usable" rather than "does this candidate clear risk".

pub mod data_quality;

pub use data_quality::{enforce_data_policy, price_in_band, quote_is_sane};
