//! Monitoring and observability module
//!
//! Prometheus metrics for the supervisor. Exposition is pull-only through
//! [`SupervisorMetrics::render`].

pub mod metrics;

pub use metrics::{ResourceMetrics, StabilityMetrics, SupervisorMetrics, SyncMetrics};
