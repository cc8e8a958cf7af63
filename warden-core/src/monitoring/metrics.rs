//! Prometheus metrics for the resilience supervisor
//!
//! Provides metrics for:
//! - Synchronization (attempts by outcome, duration, modules synced)
//! - Circuit breakers (trips per breaker)
//! - Stability (activations, fault signals, recovery step failures, mode gauges)
//! - Shared resources (constructions by outcome, live instances)
//!
//! Everything registers into a private [`Registry`]; there is no HTTP
//! endpoint, callers pull the text exposition with [`SupervisorMetrics::render`].

use prometheus::{
    Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use tracing::info;

const NAMESPACE: &str = "warden";

/// Central registry for all supervisor metrics
#[derive(Clone)]
pub struct SupervisorMetrics {
    registry: Arc<Registry>,
    sync: Arc<SyncMetrics>,
    stability: Arc<StabilityMetrics>,
    resource: Arc<ResourceMetrics>,
}

impl SupervisorMetrics {
    /// Create a new metrics registry with all metric families
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let sync = Arc::new(SyncMetrics::new(&registry)?);
        let stability = Arc::new(StabilityMetrics::new(&registry)?);
        let resource = Arc::new(ResourceMetrics::new(&registry)?);

        info!("Prometheus metrics registry initialized");

        Ok(Self {
            registry,
            sync,
            stability,
            resource,
        })
    }

    /// Get the underlying Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sync(&self) -> &SyncMetrics {
        &self.sync
    }

    pub fn stability(&self) -> &StabilityMetrics {
        &self.stability
    }

    pub fn resource(&self) -> &ResourceMetrics {
        &self.resource
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Synchronization metrics
pub struct SyncMetrics {
    /// Attempts by outcome: succeeded, failed, timeout, abandoned, rejected
    pub attempts_total: IntCounterVec,
    /// Completed passes where every module succeeded
    pub successful_syncs_total: IntCounter,
    /// Modules synced by the last successful pass
    pub modules_synced: IntGauge,
    /// Duration of the last pass in seconds
    pub last_duration_seconds: Gauge,
    /// Breaker trips by breaker name
    pub breaker_trips_total: IntCounterVec,
}

impl SyncMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let attempts_total = IntCounterVec::new(
            Opts::new("sync_attempts_total", "Sync attempts by outcome").namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(attempts_total.clone()))?;

        let successful_syncs_total = IntCounter::with_opts(
            Opts::new("sync_successful_total", "Sync passes where every module succeeded")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(successful_syncs_total.clone()))?;

        let modules_synced = IntGauge::with_opts(
            Opts::new("sync_modules_synced", "Modules synced by the last successful pass")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(modules_synced.clone()))?;

        let last_duration_seconds = Gauge::with_opts(
            Opts::new("sync_last_duration_seconds", "Duration of the last sync pass")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(last_duration_seconds.clone()))?;

        let breaker_trips_total = IntCounterVec::new(
            Opts::new("breaker_trips_total", "Circuit breaker trips").namespace(NAMESPACE),
            &["breaker"],
        )?;
        registry.register(Box::new(breaker_trips_total.clone()))?;

        Ok(Self {
            attempts_total,
            successful_syncs_total,
            modules_synced,
            last_duration_seconds,
            breaker_trips_total,
        })
    }
}

/// Stability and recovery metrics
pub struct StabilityMetrics {
    /// Emergency activations by result: executed, suppressed
    pub activations_total: IntCounterVec,
    /// Fault signals by source
    pub fault_signals_total: IntCounterVec,
    /// Recovery steps that failed, by step
    pub recovery_step_failures_total: IntCounterVec,
    /// 0 = stable, 1 = unstable, 2 = critical
    pub stability_level: IntGauge,
    /// 1 while safe mode is on
    pub safe_mode: IntGauge,
    /// 1 while emergency mode is on
    pub emergency_active: IntGauge,
    /// Health score 0..=100
    pub health_score: IntGauge,
}

impl StabilityMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let activations_total = IntCounterVec::new(
            Opts::new("emergency_activations_total", "Emergency activation requests by result")
                .namespace(NAMESPACE),
            &["result"],
        )?;
        registry.register(Box::new(activations_total.clone()))?;

        let fault_signals_total = IntCounterVec::new(
            Opts::new("fault_signals_total", "Fault signals received").namespace(NAMESPACE),
            &["source"],
        )?;
        registry.register(Box::new(fault_signals_total.clone()))?;

        let recovery_step_failures_total = IntCounterVec::new(
            Opts::new("recovery_step_failures_total", "Recovery steps that failed")
                .namespace(NAMESPACE),
            &["step"],
        )?;
        registry.register(Box::new(recovery_step_failures_total.clone()))?;

        let stability_level = IntGauge::with_opts(
            Opts::new(
                "stability_level",
                "Derived stability (0 = stable, 1 = unstable, 2 = critical)",
            )
            .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(stability_level.clone()))?;

        let safe_mode = IntGauge::with_opts(
            Opts::new("safe_mode", "Safe mode status (1 = on, 0 = off)").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(safe_mode.clone()))?;

        let emergency_active = IntGauge::with_opts(
            Opts::new("emergency_active", "Emergency mode status (1 = on, 0 = off)")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(emergency_active.clone()))?;

        let health_score = IntGauge::with_opts(
            Opts::new("health_score", "Overall health score (0-100)").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(health_score.clone()))?;
        health_score.set(100);

        Ok(Self {
            activations_total,
            fault_signals_total,
            recovery_step_failures_total,
            stability_level,
            safe_mode,
            emergency_active,
            health_score,
        })
    }
}

/// Shared resource metrics
pub struct ResourceMetrics {
    /// Constructions by outcome: succeeded, failed, abandoned
    pub constructions_total: IntCounterVec,
    /// Destroy calls that dropped at least one instance
    pub destroys_total: IntCounter,
    /// Live instances across all keys
    pub live_instances: IntGauge,
}

impl ResourceMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let constructions_total = IntCounterVec::new(
            Opts::new("resource_constructions_total", "Shared resource constructions by outcome")
                .namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(constructions_total.clone()))?;

        let destroys_total = IntCounter::with_opts(
            Opts::new("resource_destroys_total", "Destroys that dropped live instances")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(destroys_total.clone()))?;

        let live_instances = IntGauge::with_opts(
            Opts::new("resource_live_instances", "Live shared resource instances")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(live_instances.clone()))?;

        Ok(Self {
            constructions_total,
            destroys_total,
            live_instances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registry_creation() {
        let metrics = SupervisorMetrics::new().unwrap();
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_sync_metrics() {
        let metrics = SupervisorMetrics::new().unwrap();

        metrics.sync().attempts_total.with_label_values(&["succeeded"]).inc();
        metrics.sync().attempts_total.with_label_values(&["rejected"]).inc_by(2);
        metrics.sync().breaker_trips_total.with_label_values(&["sync"]).inc();
        metrics.sync().modules_synced.set(4);

        assert_eq!(
            metrics.sync().attempts_total.with_label_values(&["rejected"]).get(),
            2
        );
        assert_eq!(metrics.sync().modules_synced.get(), 4);
    }

    #[test]
    fn test_render_contains_namespaced_families() {
        let metrics = SupervisorMetrics::new().unwrap();
        metrics.stability().fault_signals_total.with_label_values(&["window"]).inc();
        metrics.resource().constructions_total.with_label_values(&["succeeded"]).inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("warden_fault_signals_total"));
        assert!(text.contains("warden_resource_constructions_total"));
        assert!(text.contains("warden_health_score 100"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = SupervisorMetrics::new().unwrap();
        let b = SupervisorMetrics::new().unwrap();
        a.stability().safe_mode.set(1);
        assert_eq!(b.stability().safe_mode.get(), 0);
    }
}
