//! Test helper utilities
//!
//! Provides:
//! - A supervisor builder preset on a manual clock
//! - Yield helpers for letting spawned tasks settle
//! - Latency measurement for benches and smoke tests

use crate::clock::ManualClock;
use crate::config::{ConfigProfile, SupervisorConfig};
use crate::storage::MemoryStore;
use crate::supervisor::SupervisorBuilder;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Builder on a fresh [`ManualClock`] with the testing profile and a memory store
pub fn manual_supervisor_builder() -> (Arc<ManualClock>, SupervisorBuilder) {
    manual_supervisor_builder_with(ConfigProfile::testing())
}

pub fn manual_supervisor_builder_with(
    config: SupervisorConfig,
) -> (Arc<ManualClock>, SupervisorBuilder) {
    let clock = Arc::new(ManualClock::new());
    let builder = SupervisorBuilder::new(config)
        .clock(clock.clone())
        .store(Arc::new(MemoryStore::new()));
    (clock, builder)
}

/// Yield to the scheduler enough times for spawned tasks to make progress
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Advance `clock` by `by`, then let spawned work settle
pub async fn advance_and_settle(clock: &ManualClock, by: Duration) {
    clock.advance(by);
    settle().await;
}

/// Measure operation latency
pub fn measure_latency<F, R>(operation: F) -> (R, Duration)
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let result = operation();
    let elapsed = start.elapsed();
    (result, elapsed)
}

/// Measure average latency over multiple runs
pub fn measure_average_latency<F>(iterations: usize, mut operation: F) -> Duration
where
    F: FnMut(),
{
    let start = Instant::now();
    for _ in 0..iterations {
        operation();
    }
    let total = start.elapsed();
    total / iterations.max(1) as u32
}
