use super::Supervisor;
use crate::clock::{Clock, SystemClock, TaskRegistry};
use crate::config::SupervisorConfig;
use crate::core::{SupervisorError, SupervisorResult};
use crate::monitoring::SupervisorMetrics;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, EmergencyRecovery, ManagedResource, ResetTarget,
    ResourceFactory, SingletonResourceManager, StabilityMonitor,
};
use crate::storage::{FaultSink, KeyValueStore, ResilientStore};
use crate::sync::{ModuleSync, SyncCoordinator};
use crate::utils::ThrottledLogger;
use std::sync::Arc;
use tracing::info;

/// Wires the supervisor's components together
///
/// ```no_run
/// use std::sync::Arc;
/// use warden_core::config::SupervisorConfig;
/// use warden_core::storage::MemoryStore;
/// use warden_core::supervisor::SupervisorBuilder;
///
/// # fn main() -> Result<(), warden_core::core::SupervisorError> {
/// let supervisor = SupervisorBuilder::new(SupervisorConfig::default())
///     .store(Arc::new(MemoryStore::new()))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn KeyValueStore>>,
    modules: Vec<Arc<dyn ModuleSync>>,
    resources: Vec<Arc<dyn ResetTarget>>,
    metrics: Option<SupervisorMetrics>,
}

impl SupervisorBuilder {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            clock: None,
            store: None,
            modules: Vec::new(),
            resources: Vec::new(),
            metrics: None,
        }
    }

    /// Time source; defaults to [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Primary store, wrapped in a [`ResilientStore`]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn module(mut self, module: Arc<dyn ModuleSync>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn resource(mut self, target: Arc<dyn ResetTarget>) -> Self {
        self.resources.push(target);
        self
    }

    /// Register a singleton manager for reset and rewarm under recovery
    pub fn managed_resource<F: ResourceFactory>(
        self,
        name: impl Into<String>,
        manager: Arc<SingletonResourceManager<F>>,
        config: F::Config,
    ) -> Self {
        self.resource(Arc::new(ManagedResource::new(name, manager, config)))
    }

    /// Share an existing metrics registry (e.g. with resource managers)
    pub fn metrics(mut self, metrics: SupervisorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> SupervisorResult<Supervisor> {
        self.config
            .validate()
            .map_err(|e| SupervisorError::Config(e.to_string()))?;

        let config = self.config;
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock::new()),
        };
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => SupervisorMetrics::new()
                .map_err(|e| SupervisorError::Config(format!("metrics registry: {}", e)))?,
        };

        let tasks = Arc::new(TaskRegistry::new());
        let throttle = Arc::new(ThrottledLogger::new(
            Arc::clone(&clock),
            config.logging.throttle_window(),
        ));

        let store = self.store.map(|primary| Arc::new(ResilientStore::new(primary)));

        let mut recovery = EmergencyRecovery::new(
            Arc::clone(&clock),
            config.recovery.clone(),
            Arc::clone(&tasks),
            Arc::clone(&throttle),
        )
        .with_metrics(metrics.clone());
        if let Some(store) = &store {
            recovery = recovery.with_store(Arc::clone(store) as Arc<dyn KeyValueStore>);
        }
        for target in &self.resources {
            recovery = recovery.with_target(Arc::clone(target));
        }
        let recovery = Arc::new(recovery);

        let system_breaker = CircuitBreaker::new(
            CircuitBreakerConfig::from_settings("system", &config.system_breaker),
            Arc::clone(&clock),
        );
        let monitor = Arc::new(
            StabilityMonitor::new(
                Arc::clone(&clock),
                config.stability.clone(),
                Arc::clone(&recovery),
                system_breaker,
                Arc::clone(&throttle),
            )
            .with_metrics(metrics.clone()),
        );

        if let Some(store) = &store {
            let sink: Arc<dyn FaultSink> = monitor.clone();
            store.attach_fault_sink(Arc::downgrade(&sink));
        }

        let sync_breaker = CircuitBreaker::new(
            CircuitBreakerConfig::from_settings("sync", &config.sync_breaker),
            Arc::clone(&clock),
        );
        let coordinator = Arc::new(
            SyncCoordinator::new(Arc::clone(&clock), config.sync.clone(), sync_breaker)
                .with_monitor(Arc::clone(&monitor))
                .with_metrics(metrics.clone()),
        );
        for module in self.modules {
            coordinator.register_module(module);
        }

        info!(
            modules = coordinator.module_count(),
            resources = self.resources.len(),
            store = store.is_some(),
            "Supervisor built"
        );

        Ok(Supervisor::from_parts(
            config,
            clock,
            tasks,
            metrics,
            coordinator,
            monitor,
            recovery,
            store,
            self.resources,
        ))
    }
}
