//! Operations and observability.
//!
//! - [`observability`] - Metric names and the counters/gauges registry

pub mod observability;
