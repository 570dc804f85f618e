//! # Observability
//!
//! Prometheus metrics collection. Structured logging is set up by the runtime
//! with `tracing-subscriber`.

pub mod metrics;

pub use metrics::*;
