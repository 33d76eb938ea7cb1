//! Push-based observability: outbound only, no inbound `/metrics` endpoint.
//! A `Metrics` registry backs the periodic `METRICS_JSON:` log line emitted
//! by [`MetricsReporter`] (§2 ADD).

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::{AccountCache, MetricsReporter};
