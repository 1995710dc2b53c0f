//! Observability for the auth gate.
//!
//! The engine records through the `metrics` facade; this module installs
//! the Prometheus recorder that backs it.

pub mod metrics;

pub use metrics::init_metrics_recorder;
