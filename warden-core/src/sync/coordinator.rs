//! Breaker-gated synchronization coordinator
//!
//! `sync_all` is single-flighted by an atomic flag. A pass runs every module
//! concurrently under one timeout and records on the breaker exactly once,
//! after all modules settle or the timeout fires. When the timeout wins, the
//! joined module futures are dropped, cancelling their remaining work.
//!
//! A module that panics counts as a failed module. A pass that is dropped or
//! unwinds after taking its attempt is recorded as a failure by its guard, so
//! a consumed half-open probe always resolves.

use super::{ModuleSync, RejectReason, SyncOutcome, SyncSession};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::core::SupervisorError;
use crate::monitoring::SupervisorMetrics;
use crate::resilience::panic::panic_message;
use crate::resilience::{CircuitBreaker, CircuitBreakerState, StabilityMonitor};
use futures::future::{join_all, FutureExt};
use parking_lot::{Mutex, RwLock};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Dashboard snapshot of the coordinator
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub session_started_at: Instant,
    pub attempts_this_session: u32,
    pub max_attempts_per_session: u32,
    pub last_sync_at: Option<Instant>,
    pub is_syncing: bool,
    pub errors: Vec<String>,
    pub breaker: CircuitBreakerState,
    pub successful_syncs: u64,
    pub modules_synced: usize,
    pub last_duration: Option<Duration>,
}

#[derive(Debug, Default)]
struct SyncStats {
    successful_syncs: u64,
    modules_synced: usize,
    last_duration: Option<Duration>,
}

/// Clears the in-flight flag however the pass ends
///
/// Once the pass has taken an attempt it must settle the breaker. If it is
/// dropped first (cancelled task, unwinding), the guard records the failure.
struct PassGuard<'a> {
    coordinator: &'a SyncCoordinator,
    unsettled: bool,
}

impl PassGuard<'_> {
    fn attempt_taken(&mut self) {
        self.unsettled = true;
    }

    fn settled(&mut self) {
        self.unsettled = false;
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.unsettled {
            self.coordinator.on_abandoned();
        }
        self.coordinator.syncing.store(false, Ordering::Release);
    }
}

pub struct SyncCoordinator {
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    breaker: CircuitBreaker,
    modules: RwLock<Vec<Arc<dyn ModuleSync>>>,
    session: Mutex<SyncSession>,
    stats: Mutex<SyncStats>,
    syncing: AtomicBool,
    monitor: Option<Arc<StabilityMonitor>>,
    metrics: Option<SupervisorMetrics>,
}

impl SyncCoordinator {
    pub fn new(clock: Arc<dyn Clock>, config: SyncConfig, breaker: CircuitBreaker) -> Self {
        let session = SyncSession::new(clock.now(), config.max_recorded_errors);
        Self {
            clock,
            config,
            breaker,
            modules: RwLock::new(Vec::new()),
            session: Mutex::new(session),
            stats: Mutex::new(SyncStats::default()),
            syncing: AtomicBool::new(false),
            monitor: None,
            metrics: None,
        }
    }

    /// Report breaker escalations to `monitor`
    pub fn with_monitor(mut self, monitor: Arc<StabilityMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_metrics(mut self, metrics: SupervisorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn register_module(&self, module: Arc<dyn ModuleSync>) {
        debug!(module = module.name(), "Registered sync module");
        self.modules.write().push(module);
    }

    pub fn module_count(&self) -> usize {
        self.modules.read().len()
    }

    /// Run one synchronization pass across all modules, unless gated
    pub async fn sync_all(&self) -> SyncOutcome {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return self.reject(RejectReason::InFlight);
        }
        let mut guard = PassGuard {
            coordinator: self,
            unsettled: false,
        };

        let now = self.clock.now();
        {
            let mut session = self.session.lock();
            if session.budget_exhausted(self.config.max_attempts_per_session) {
                drop(session);
                return self.reject(RejectReason::BudgetExhausted);
            }
            if session.last_sync_at().map_or(false, |last| {
                now.saturating_duration_since(last) < self.config.min_interval()
            }) {
                drop(session);
                return self.reject(RejectReason::TooSoon);
            }
            // Breaker last: a half-open probe must only be consumed by a real attempt
            if !self.breaker.can_attempt() {
                drop(session);
                return self.reject(RejectReason::BreakerOpen);
            }
            session.record_attempt();
            guard.attempt_taken();
        }

        let modules: Vec<Arc<dyn ModuleSync>> = self.modules.read().clone();
        let timeout = self.config.timeout();
        debug!(modules = modules.len(), "Starting sync pass");

        let pass = join_all(modules.iter().map(|module| async move {
            let name = module.name().to_string();
            let result = match AssertUnwindSafe(module.sync()).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(SupervisorError::ModulePanicked {
                    module: name.clone(),
                    message: panic_message(payload.as_ref()),
                }),
            };
            (name, result)
        }));

        let results = tokio::select! {
            results = pass => Some(results),
            _ = self.clock.sleep(timeout) => None,
        };

        let duration = self.clock.elapsed_since(now);
        guard.settled();
        match results {
            Some(results) => {
                let errors: Vec<String> = results
                    .into_iter()
                    .filter_map(|(name, result)| match result {
                        Ok(()) => None,
                        Err(e) => Some(format!("{}: {}", name, e)),
                    })
                    .collect();

                if errors.is_empty() {
                    self.on_success(modules.len(), duration)
                } else {
                    self.on_failure(errors, false)
                }
            }
            None => {
                let error = SupervisorError::SyncTimeout(timeout).to_string();
                self.on_failure(vec![error], true)
            }
        }
    }

    /// Start `sync_all` on the current tokio runtime without waiting
    ///
    /// Returns `None` when no runtime is available.
    pub fn trigger(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<SyncOutcome>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                debug!("No runtime, skipping triggered sync");
                return None;
            }
        };
        let coordinator = Arc::clone(self);
        Some(runtime.spawn(async move { coordinator.sync_all().await }))
    }

    /// Clear the attempt budget and breaker counters together
    pub fn reset_session(&self) {
        let max_errors = self.config.max_recorded_errors;
        *self.session.lock() = SyncSession::new(self.clock.now(), max_errors);
        self.breaker.reset();
        info!("Sync session reset");
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn status(&self) -> SyncStatus {
        let session = self.session.lock().clone();
        let stats = self.stats.lock();
        SyncStatus {
            session_started_at: session.started_at(),
            attempts_this_session: session.attempts(),
            max_attempts_per_session: self.config.max_attempts_per_session,
            last_sync_at: session.last_sync_at(),
            is_syncing: self.is_syncing(),
            errors: session.errors().map(str::to_string).collect(),
            breaker: self.breaker.snapshot(),
            successful_syncs: stats.successful_syncs,
            modules_synced: stats.modules_synced,
            last_duration: stats.last_duration,
        }
    }

    fn reject(&self, reason: RejectReason) -> SyncOutcome {
        debug!(reason = reason.as_str(), "Sync rejected");
        self.count_attempt("rejected");
        SyncOutcome::Rejected(reason)
    }

    fn on_success(&self, modules: usize, duration: Duration) -> SyncOutcome {
        self.breaker.record_success();
        self.session.lock().record_success(self.clock.now());
        {
            let mut stats = self.stats.lock();
            stats.successful_syncs += 1;
            stats.modules_synced = modules;
            stats.last_duration = Some(duration);
        }

        if let Some(metrics) = &self.metrics {
            metrics.sync().successful_syncs_total.inc();
            metrics.sync().modules_synced.set(modules as i64);
            metrics
                .sync()
                .last_duration_seconds
                .set(duration.as_secs_f64());
        }
        self.count_attempt("succeeded");

        debug!(modules, duration_ms = duration.as_millis() as u64, "Sync pass succeeded");
        SyncOutcome::Succeeded { modules, duration }
    }

    fn on_failure(&self, errors: Vec<String>, timed_out: bool) -> SyncOutcome {
        let escalated = self.breaker.record_failure();
        self.session.lock().record_errors(errors.iter().cloned());
        self.count_attempt(if timed_out { "timeout" } else { "failed" });

        warn!(errors = errors.len(), timed_out, escalated, "Sync pass failed");
        self.on_breaker_failure(escalated);

        SyncOutcome::Failed {
            errors,
            timed_out,
            escalated,
        }
    }

    fn on_abandoned(&self) {
        let escalated = self.breaker.record_failure();
        self.session
            .lock()
            .record_errors([SupervisorError::SyncAbandoned.to_string()]);
        self.count_attempt("abandoned");

        warn!(escalated, "Sync pass abandoned before completion");
        self.on_breaker_failure(escalated);
    }

    fn on_breaker_failure(&self, escalated: bool) {
        if escalated {
            if let Some(metrics) = &self.metrics {
                metrics
                    .sync()
                    .breaker_trips_total
                    .with_label_values(&[self.breaker.name()])
                    .inc();
            }
            if let Some(monitor) = &self.monitor {
                monitor.report_escalation("sync");
            }
        }
    }

    fn count_attempt(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .sync()
                .attempts_total
                .with_label_values(&[outcome])
                .inc();
        }
    }
}
