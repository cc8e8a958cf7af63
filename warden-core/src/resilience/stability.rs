//! Stability monitoring and emergency escalation
//!
//! ```text
//! Stable -> SafeMode -> EmergencyActive -> (lock elapsed AND check Stable) -> Stable
//! ```
//!
//! - Escalations from the sync breaker put the system in safe mode and count
//!   against the system-fault breaker; when that trips, emergency mode is
//!   activated.
//! - Fault signals are counted; every `fault_threshold` of them triggers an
//!   activation and resets the count.
//! - An activation is guarded by a self-expiring [`SafetyLock`] and a minimum
//!   spacing between activations. Blocked callers decline and do not queue.
//! - The periodic stability check derives [`SystemStability`] from recent
//!   activations and leaves safe/emergency mode once stable.
//!
//! Emergency mode always implies safe mode.

use crate::clock::Clock;
use crate::config::StabilityConfig;
use crate::core::{HealthStatus, SystemStability};
use crate::monitoring::SupervisorMetrics;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::recovery::{EmergencyRecovery, RecoveryReport};
use crate::resilience::safety_lock::SafetyLock;
use crate::storage::FaultSink;
use crate::utils::ThrottledLogger;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Health score penalty per activation inside the critical window
const ACTIVATION_PENALTY: i32 = 15;
const SAFE_MODE_PENALTY: i32 = 20;
const CRITICAL_PENALTY: i32 = 30;

/// Why an activation request did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    LockHeld,
    Cooldown,
}

#[derive(Debug, Clone)]
pub enum ActivationOutcome {
    Executed(RecoveryReport),
    Suppressed(SuppressReason),
}

impl ActivationOutcome {
    pub fn executed(&self) -> bool {
        matches!(self, Self::Executed(_))
    }
}

/// Snapshot of the monitor's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityRecord {
    pub activation_count: u64,
    pub last_activation_at: Option<Instant>,
    pub safety_lock_until: Option<Instant>,
    pub system_stability: SystemStability,
    pub safe_mode: bool,
    pub emergency_active: bool,
    pub pending_fault_signals: u32,
}

#[derive(Debug, Default)]
struct ActivationLog {
    total: u64,
    last: Option<Instant>,
    /// Activation instants inside the stability window
    recent: VecDeque<Instant>,
}

pub struct StabilityMonitor {
    clock: Arc<dyn Clock>,
    config: StabilityConfig,
    lock: Arc<SafetyLock>,
    recovery: Arc<EmergencyRecovery>,
    system_breaker: CircuitBreaker,
    throttle: Arc<ThrottledLogger>,
    metrics: Option<SupervisorMetrics>,
    activations: Mutex<ActivationLog>,
    fault_signals: AtomicU32,
    safe_mode: AtomicBool,
    emergency_active: AtomicBool,
    stability: AtomicU8,
}

impl StabilityMonitor {
    pub fn new(
        clock: Arc<dyn Clock>,
        config: StabilityConfig,
        recovery: Arc<EmergencyRecovery>,
        system_breaker: CircuitBreaker,
        throttle: Arc<ThrottledLogger>,
    ) -> Self {
        Self {
            lock: Arc::new(SafetyLock::new(Arc::clone(&clock))),
            clock,
            config,
            recovery,
            system_breaker,
            throttle,
            metrics: None,
            activations: Mutex::new(ActivationLog::default()),
            fault_signals: AtomicU32::new(0),
            safe_mode: AtomicBool::new(false),
            emergency_active: AtomicBool::new(false),
            stability: AtomicU8::new(SystemStability::Stable as u8),
        }
    }

    pub fn with_metrics(mut self, metrics: SupervisorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enter emergency mode and run recovery, unless guarded
    ///
    /// Declines while the safety lock is held or within the activation
    /// cooldown of the previous activation. The lock is released after the
    /// configured hold whatever recovery does.
    pub fn activate_emergency_mode(&self, reason: &str) -> ActivationOutcome {
        let token = {
            let mut log = self.activations.lock();
            let now = self.clock.now();

            let suppressed = if self.lock.is_held() {
                Some(SuppressReason::LockHeld)
            } else if log.last.map_or(false, |last| {
                now.saturating_duration_since(last) < self.config.activation_cooldown()
            }) {
                Some(SuppressReason::Cooldown)
            } else {
                None
            };

            let acquired = match suppressed {
                Some(why) => Err(why),
                None => self
                    .lock
                    .try_acquire(self.config.safety_lock())
                    .ok_or(SuppressReason::LockHeld),
            };

            let token = match acquired {
                Ok(token) => token,
                Err(why) => {
                    drop(log);
                    self.throttle.warn(
                        "emergency_suppressed",
                        format_args!("Emergency activation suppressed ({:?}): {}", why, reason),
                    );
                    self.count_activation("suppressed");
                    return ActivationOutcome::Suppressed(why);
                }
            };

            log.total += 1;
            log.last = Some(now);
            log.recent.push_back(now);
            token
        };

        self.emergency_active.store(true, Ordering::Release);
        self.safe_mode.store(true, Ordering::Release);
        error!(reason, "EMERGENCY MODE ACTIVATED");

        let lock = Arc::clone(&self.lock);
        self.clock.schedule_after(
            self.config.safety_lock(),
            Box::new(move || {
                lock.release(token);
            }),
        );

        let report = self.recovery.run(reason);
        if !report.is_clean() {
            warn!(
                failed = report.failed_steps().count(),
                "Emergency recovery finished with failed steps"
            );
        }

        self.count_activation("executed");
        self.refresh_stability(self.clock.now());
        ActivationOutcome::Executed(report)
    }

    /// Count a fault signal, activating emergency mode at the threshold
    ///
    /// Returns `true` if this signal triggered an activation attempt.
    pub fn handle_fault_signal(&self, source: &str) -> bool {
        if let Some(metrics) = &self.metrics {
            metrics
                .stability()
                .fault_signals_total
                .with_label_values(&[source])
                .inc();
        }

        let threshold = self.config.fault_threshold.max(1);
        let previous = self
            .fault_signals
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                let next = count + 1;
                Some(if next >= threshold { 0 } else { next })
            })
            .unwrap_or_default();

        if previous + 1 < threshold {
            self.throttle
                .debug("fault_signal", format_args!("Fault signal from {}", source));
            return false;
        }

        warn!(source, threshold, "Fault signal threshold reached");
        self.activate_emergency_mode(&format!("fault threshold reached ({})", source));
        true
    }

    /// Called when a lower-level breaker trips
    ///
    /// Enters safe mode and counts against the system breaker. Returns the
    /// activation outcome if the system breaker tripped as well.
    pub fn report_escalation(&self, source: &str) -> Option<ActivationOutcome> {
        if !self.safe_mode.swap(true, Ordering::AcqRel) {
            warn!(source, "Entering safe mode");
        }
        self.publish_gauges();

        if self.system_breaker.record_failure() {
            if let Some(metrics) = &self.metrics {
                metrics
                    .sync()
                    .breaker_trips_total
                    .with_label_values(&[self.system_breaker.name()])
                    .inc();
            }
            return Some(self.activate_emergency_mode(&format!("system breaker tripped ({})", source)));
        }

        self.throttle.warn(
            "escalation",
            format_args!("Escalation from {} recorded against system breaker", source),
        );
        None
    }

    /// Recompute stability and leave safe mode if it is safe to do so
    pub fn perform_stability_check(&self) -> SystemStability {
        let now = self.clock.now();
        let stability = self.refresh_stability(now);

        if stability == SystemStability::Stable
            && !self.lock.is_held()
            && self.safe_mode.load(Ordering::Acquire)
        {
            self.safe_mode.store(false, Ordering::Release);
            self.emergency_active.store(false, Ordering::Release);
            info!("System stable, leaving safe mode");
            self.publish_gauges();
        }

        stability
    }

    /// Clear the lock, counters, breaker and modes
    ///
    /// The lifetime activation count is kept; the recent history used for
    /// stability is dropped.
    pub fn force_recovery(&self) {
        warn!("Forced recovery requested, clearing emergency state");
        self.lock.force_release();
        self.fault_signals.store(0, Ordering::Release);
        self.system_breaker.reset();
        {
            let mut log = self.activations.lock();
            log.last = None;
            log.recent.clear();
        }
        self.safe_mode.store(false, Ordering::Release);
        self.emergency_active.store(false, Ordering::Release);
        self.stability
            .store(SystemStability::Stable as u8, Ordering::Release);
        self.publish_gauges();
    }

    fn refresh_stability(&self, now: Instant) -> SystemStability {
        let stability = {
            let mut log = self.activations.lock();
            let window = self.config.stability_window();
            while log
                .recent
                .front()
                .map_or(false, |t| now.saturating_duration_since(*t) >= window)
            {
                log.recent.pop_front();
            }

            let critical_window = self.config.critical_window();
            let clustered = log
                .recent
                .iter()
                .filter(|t| now.saturating_duration_since(**t) < critical_window)
                .count();

            if clustered >= self.config.critical_activations as usize {
                SystemStability::Critical
            } else if !log.recent.is_empty() {
                SystemStability::Unstable
            } else {
                SystemStability::Stable
            }
        };

        let previous: SystemStability = self
            .stability
            .swap(stability as u8, Ordering::AcqRel)
            .into();
        if previous != stability {
            info!(from = %previous, to = %stability, "System stability changed");
        }
        self.publish_gauges();
        stability
    }

    fn count_activation(&self, result: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .stability()
                .activations_total
                .with_label_values(&[result])
                .inc();
        }
    }

    fn publish_gauges(&self) {
        if let Some(metrics) = &self.metrics {
            let m = metrics.stability();
            m.stability_level.set(self.stability() as i64);
            m.safe_mode.set(self.is_safe_mode() as i64);
            m.emergency_active.set(self.is_emergency_active() as i64);
            m.health_score.set(self.health_score() as i64);
        }
    }

    /// 0..=100, starting from 100 and subtracting for recent activations,
    /// safe mode and critical stability
    pub fn health_score(&self) -> u8 {
        let now = self.clock.now();
        let critical_window = self.config.critical_window();
        let clustered = self
            .activations
            .lock()
            .recent
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < critical_window)
            .count() as i32;

        let mut score = 100 - clustered * ACTIVATION_PENALTY;
        if self.is_safe_mode() {
            score -= SAFE_MODE_PENALTY;
        }
        if self.stability() == SystemStability::Critical {
            score -= CRITICAL_PENALTY;
        }
        score.clamp(0, 100) as u8
    }

    pub fn health_status(&self) -> HealthStatus {
        match self.stability() {
            SystemStability::Critical => HealthStatus::Critical,
            SystemStability::Unstable => HealthStatus::Degraded,
            SystemStability::Stable if self.is_safe_mode() => HealthStatus::Degraded,
            SystemStability::Stable => HealthStatus::Healthy,
        }
    }

    pub fn is_safe_mode(&self) -> bool {
        self.safe_mode.load(Ordering::Acquire)
    }

    pub fn is_emergency_active(&self) -> bool {
        self.emergency_active.load(Ordering::Acquire)
    }

    pub fn stability(&self) -> SystemStability {
        self.stability.load(Ordering::Acquire).into()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    pub fn pending_fault_signals(&self) -> u32 {
        self.fault_signals.load(Ordering::Acquire)
    }

    pub fn system_breaker(&self) -> &CircuitBreaker {
        &self.system_breaker
    }

    pub fn recovery(&self) -> &Arc<EmergencyRecovery> {
        &self.recovery
    }

    pub fn recovery_history(&self) -> Vec<RecoveryReport> {
        self.recovery.recovery_history()
    }

    pub fn record(&self) -> StabilityRecord {
        let log = self.activations.lock();
        StabilityRecord {
            activation_count: log.total,
            last_activation_at: log.last,
            safety_lock_until: self.lock.held_until(),
            system_stability: self.stability(),
            safe_mode: self.is_safe_mode(),
            emergency_active: self.is_emergency_active(),
            pending_fault_signals: self.pending_fault_signals(),
        }
    }
}

impl FaultSink for StabilityMonitor {
    fn report_fault(&self, source: &str) {
        self.handle_fault_signal(source);
    }
}
