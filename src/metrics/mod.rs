// src/metrics/mod.rs
//
// Not present in the retrieved teacher pack (only referenced via
// `crate::metrics::{MetricsCollector, MetricsRegistry}` in main.rs); written
// fresh to mirror the shape `config/mod.rs` and `proxy/mod.rs` use for their
// own submodule re-exports.
mod collector;
mod rps;

pub use collector::{BackendMetricsSnapshot, MetricsCollector, MetricsRegistry, MetricsSnapshot};
