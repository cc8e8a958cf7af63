//! Composition root
//!
//! [`Supervisor`] owns every component and their lifecycle:
//! `SupervisorBuilder::build` → [`Supervisor::start`] → [`Supervisor::shutdown`].
//! There are no process-wide singletons; components hold `Arc`s of their
//! collaborators.

pub mod builder;

pub use builder::SupervisorBuilder;

use crate::clock::{Clock, ScheduledHandle, TaskRegistry, TaskScope};
use crate::config::SupervisorConfig;
use crate::core::{HealthReport, HealthStatus};
use crate::monitoring::SupervisorMetrics;
use crate::resilience::{EmergencyRecovery, RecoveryReport, ResetTarget, StabilityMonitor};
use crate::storage::ResilientStore;
use crate::sync::{ModuleSync, SyncCoordinator};
use futures::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Best-effort work run by `on_unload`/`shutdown`
pub type UnloadHook = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub struct Supervisor {
    config: SupervisorConfig,
    clock: Arc<dyn Clock>,
    tasks: Arc<TaskRegistry>,
    metrics: SupervisorMetrics,
    coordinator: Arc<SyncCoordinator>,
    monitor: Arc<StabilityMonitor>,
    recovery: Arc<EmergencyRecovery>,
    store: Option<Arc<ResilientStore>>,
    resources: Vec<Arc<dyn ResetTarget>>,
    unload_hooks: Mutex<Vec<Arc<UnloadHook>>>,
    started: AtomicBool,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        config: SupervisorConfig,
        clock: Arc<dyn Clock>,
        tasks: Arc<TaskRegistry>,
        metrics: SupervisorMetrics,
        coordinator: Arc<SyncCoordinator>,
        monitor: Arc<StabilityMonitor>,
        recovery: Arc<EmergencyRecovery>,
        store: Option<Arc<ResilientStore>>,
        resources: Vec<Arc<dyn ResetTarget>>,
    ) -> Self {
        Self {
            config,
            clock,
            tasks,
            metrics,
            coordinator,
            monitor,
            recovery,
            store,
            resources,
            unload_hooks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Schedule the periodic sync tick and stability check, then warm resources
    ///
    /// Calling `start` twice is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("Supervisor already started");
            return;
        }

        if let Some(period) = self.config.sync.period() {
            let coordinator = Arc::clone(&self.coordinator);
            let handle = self.clock.schedule_every(
                period,
                Arc::new(move || {
                    coordinator.trigger();
                }),
            );
            self.tasks.register(TaskScope::Core, "sync-tick", handle);
        }

        if let Some(period) = self.config.stability.check_period() {
            let monitor = Arc::clone(&self.monitor);
            let handle = self.clock.schedule_every(
                period,
                Arc::new(move || {
                    monitor.perform_stability_check();
                }),
            );
            self.tasks.register(TaskScope::Core, "stability-check", handle);
        }

        if self.config.resource.warm_on_start {
            for resource in &self.resources {
                resource.rewarm();
            }
        }

        info!(
            sync_period_secs = self.config.sync.period_secs,
            check_period_secs = self.config.stability.check_period_secs,
            "Supervisor started"
        );
    }

    /// Cancel scheduled work and run unload hooks within the shutdown timeout
    pub async fn shutdown(&self) {
        let cancelled = self.tasks.cancel_all();
        self.started.store(false, Ordering::Release);
        debug!(cancelled, "Cancelled scheduled callbacks");

        self.on_unload().await;
        info!("Supervisor shut down");
    }

    /// A global error handler saw an uncaught error
    ///
    /// Counts as a fault signal; returns whether it triggered an activation.
    pub fn on_global_error(&self, source: &str) -> bool {
        self.monitor.handle_fault_signal(source)
    }

    /// Best-effort flush before the host goes away
    ///
    /// Runs every unload hook concurrently, bounded by the shutdown timeout.
    /// Returns `false` if the timeout cut them short.
    pub async fn on_unload(&self) -> bool {
        let hooks: Vec<Arc<UnloadHook>> = self.unload_hooks.lock().clone();
        if hooks.is_empty() {
            return true;
        }

        let timeout = self.config.lifecycle.shutdown_timeout();
        let all = join_all(hooks.iter().map(|hook| (**hook)()));
        tokio::select! {
            _ = all => {
                debug!(hooks = hooks.len(), "Unload hooks completed");
                true
            }
            _ = self.clock.sleep(timeout) => {
                warn!(
                    hooks = hooks.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Unload hooks timed out"
                );
                false
            }
        }
    }

    pub fn add_unload_hook(&self, hook: UnloadHook) {
        self.unload_hooks.lock().push(Arc::new(hook));
    }

    /// Schedule delayed work that recovery may release
    pub fn schedule_transient(
        &self,
        label: impl Into<String>,
        delay: Duration,
        callback: crate::clock::Callback,
    ) -> ScheduledHandle {
        let handle = self.clock.schedule_after(delay, callback);
        self.tasks
            .register(TaskScope::Transient, label, handle.clone());
        handle
    }

    pub fn register_module(&self, module: Arc<dyn ModuleSync>) {
        self.coordinator.register_module(module);
    }

    pub fn health(&self) -> HealthReport {
        let record = self.monitor.record();
        let sync_breaker_open = self.coordinator.breaker().is_open();
        let status = match self.monitor.health_status() {
            HealthStatus::Healthy if sync_breaker_open => HealthStatus::Degraded,
            status => status,
        };

        HealthReport {
            status,
            score: self.monitor.health_score(),
            stability: record.system_stability,
            safe_mode: record.safe_mode,
            emergency_active: record.emergency_active,
            activation_count: record.activation_count,
            sync_breaker_open,
            live_resources: self.resources.iter().map(|r| r.live_instances()).sum(),
        }
    }

    pub fn recovery_history(&self) -> Vec<RecoveryReport> {
        self.recovery.recovery_history()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn metrics(&self) -> &SupervisorMetrics {
        &self.metrics
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn monitor(&self) -> &Arc<StabilityMonitor> {
        &self.monitor
    }

    /// The resilient wrapper around the configured primary store
    pub fn store(&self) -> Option<&Arc<ResilientStore>> {
        self.store.as_ref()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.tasks.cancel_all();
    }
}
