//! Emergency recovery steps
//!
//! Recovery is an ordered list of idempotent steps:
//! 1. Purge transient state from storage, keeping the preserved keys
//! 2. Reset shared resources (rebuilt after a delay)
//! 3. Release orphaned transient callbacks
//!
//! Each step is wrapped: an error or a panic is logged, counted and skipped,
//! and the next step still runs. Every run produces a [`RecoveryReport`] kept
//! in a bounded history.

use crate::clock::{Clock, ScheduledHandle, TaskRegistry};
use crate::config::RecoveryConfig;
use crate::core::{SupervisorError, SupervisorResult};
use crate::monitoring::SupervisorMetrics;
use crate::resilience::panic::panic_message;
use crate::storage::{purge_except, KeyValueStore};
use crate::utils::ThrottledLogger;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Something recovery can tear down and rebuild
pub trait ResetTarget: Send + Sync {
    fn name(&self) -> &str;

    /// Drop live state, returning how many instances went away
    fn reset(&self) -> SupervisorResult<usize>;

    /// Rebuild lazily dropped state
    fn rewarm(&self);

    fn live_instances(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecoveryStep {
    PurgeTransientState,
    ResetSharedResources,
    ReleaseOrphanedCallbacks,
}

impl RecoveryStep {
    /// Execution order
    pub const ALL: [RecoveryStep; 3] = [
        RecoveryStep::PurgeTransientState,
        RecoveryStep::ResetSharedResources,
        RecoveryStep::ReleaseOrphanedCallbacks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PurgeTransientState => "purge_transient_state",
            Self::ResetSharedResources => "reset_shared_resources",
            Self::ReleaseOrphanedCallbacks => "release_orphaned_callbacks",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepOutcome {
    /// `affected` is step specific: keys purged, instances dropped, callbacks cancelled
    Completed { affected: usize },
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: RecoveryStep,
    pub outcome: StepOutcome,
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub reason: String,
    #[serde(skip)]
    pub started_at: Instant,
    pub duration: Duration,
    pub steps: Vec<StepReport>,
}

impl RecoveryReport {
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }

    pub fn is_clean(&self) -> bool {
        self.failed_steps().next().is_none()
    }
}

pub struct EmergencyRecovery {
    clock: Arc<dyn Clock>,
    config: RecoveryConfig,
    tasks: Arc<TaskRegistry>,
    throttle: Arc<ThrottledLogger>,
    store: Option<Arc<dyn KeyValueStore>>,
    targets: Vec<Arc<dyn ResetTarget>>,
    metrics: Option<SupervisorMetrics>,
    history: Mutex<VecDeque<RecoveryReport>>,
    pending_rewarm: Mutex<Option<ScheduledHandle>>,
}

impl EmergencyRecovery {
    pub fn new(
        clock: Arc<dyn Clock>,
        config: RecoveryConfig,
        tasks: Arc<TaskRegistry>,
        throttle: Arc<ThrottledLogger>,
    ) -> Self {
        Self {
            clock,
            config,
            tasks,
            throttle,
            store: None,
            targets: Vec::new(),
            metrics: None,
            history: Mutex::new(VecDeque::new()),
            pending_rewarm: Mutex::new(None),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_target(mut self, target: Arc<dyn ResetTarget>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_metrics(mut self, metrics: SupervisorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn targets(&self) -> &[Arc<dyn ResetTarget>] {
        &self.targets
    }

    /// Run every step in order
    pub fn run(&self, reason: &str) -> RecoveryReport {
        let started_at = self.clock.now();
        info!(reason, "Running emergency recovery");

        let mut steps = Vec::with_capacity(RecoveryStep::ALL.len());
        for step in RecoveryStep::ALL {
            let step_start = self.clock.now();
            let outcome = match catch_unwind(AssertUnwindSafe(|| self.execute(step))) {
                Ok(Ok(affected)) => StepOutcome::Completed { affected },
                Ok(Err(e)) => StepOutcome::Failed(e.to_string()),
                Err(payload) => {
                    StepOutcome::Failed(format!("step panicked: {}", panic_message(payload.as_ref())))
                }
            };

            if let StepOutcome::Failed(error) = &outcome {
                self.throttle.warn(
                    "recovery_step_failed",
                    format_args!("Recovery step {} failed: {}", step.as_str(), error),
                );
                if let Some(metrics) = &self.metrics {
                    metrics
                        .stability()
                        .recovery_step_failures_total
                        .with_label_values(&[step.as_str()])
                        .inc();
                }
            } else {
                debug!(step = step.as_str(), ?outcome, "Recovery step completed");
            }

            steps.push(StepReport {
                step,
                outcome,
                duration: self.clock.elapsed_since(step_start),
            });
        }

        let report = RecoveryReport {
            reason: reason.to_string(),
            started_at,
            duration: self.clock.elapsed_since(started_at),
            steps,
        };

        let mut history = self.history.lock();
        history.push_back(report.clone());
        while history.len() > self.config.history_limit {
            history.pop_front();
        }

        report
    }

    fn execute(&self, step: RecoveryStep) -> SupervisorResult<usize> {
        match step {
            RecoveryStep::PurgeTransientState => match &self.store {
                Some(store) => Ok(purge_except(store.as_ref(), &self.config.preserved_keys)?),
                None => Ok(0),
            },
            RecoveryStep::ResetSharedResources => self.reset_targets(),
            RecoveryStep::ReleaseOrphanedCallbacks => Ok(self.tasks.release_transient()),
        }
    }

    fn reset_targets(&self) -> SupervisorResult<usize> {
        let mut dropped = 0;
        let mut first_error: Option<SupervisorError> = None;

        for target in &self.targets {
            match target.reset() {
                Ok(n) => dropped += n,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if !self.targets.is_empty() {
            self.schedule_rewarm();
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(dropped),
        }
    }

    /// Rebuild reset targets after the configured delay
    ///
    /// A rewarm still pending from an earlier run is replaced.
    fn schedule_rewarm(&self) {
        let targets = self.targets.clone();
        let handle = self.clock.schedule_after(
            self.config.rewarm_delay(),
            Box::new(move || {
                for target in &targets {
                    target.rewarm();
                }
            }),
        );

        if let Some(previous) = self.pending_rewarm.lock().replace(handle) {
            previous.cancel();
        }
    }

    /// Most recent reports, oldest first
    pub fn recovery_history(&self) -> Vec<RecoveryReport> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn last_report(&self) -> Option<RecoveryReport> {
        self.history.lock().back().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, TaskScope};
    use crate::storage::MemoryStore;
    use crate::testing::FailingStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Target {
        resets: AtomicUsize,
        rewarms: AtomicUsize,
        fail: bool,
    }

    impl ResetTarget for Target {
        fn name(&self) -> &str {
            "target"
        }

        fn reset(&self) -> SupervisorResult<usize> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SupervisorError::ConstructionFailed("stuck".into()))
            } else {
                Ok(1)
            }
        }

        fn rewarm(&self) {
            self.rewarms.fetch_add(1, Ordering::SeqCst);
        }

        fn live_instances(&self) -> usize {
            0
        }
    }

    fn recovery(clock: &Arc<ManualClock>, tasks: &Arc<TaskRegistry>) -> EmergencyRecovery {
        let throttle = Arc::new(ThrottledLogger::new(clock.clone(), Duration::from_secs(60)));
        EmergencyRecovery::new(
            clock.clone(),
            RecoveryConfig::default(),
            Arc::clone(tasks),
            throttle,
        )
    }

    #[test]
    fn test_steps_run_in_order() {
        let clock = Arc::new(ManualClock::new());
        let tasks = Arc::new(TaskRegistry::new());
        let store = Arc::new(MemoryStore::new());
        store.set("auth_token", "t").unwrap();
        store.set("quiz_cache", "c").unwrap();
        tasks.register(
            TaskScope::Transient,
            "toast",
            clock.schedule_after(Duration::from_secs(60), Box::new(|| {})),
        );

        let target = Arc::new(Target::default());
        let recovery = recovery(&clock, &tasks)
            .with_store(store.clone())
            .with_target(target.clone());

        let report = recovery.run("test");

        let steps: Vec<_> = report.steps.iter().map(|s| s.step).collect();
        assert_eq!(steps, RecoveryStep::ALL.to_vec());
        assert_eq!(report.steps[0].outcome, StepOutcome::Completed { affected: 1 });
        assert_eq!(report.steps[1].outcome, StepOutcome::Completed { affected: 1 });
        assert_eq!(report.steps[2].outcome, StepOutcome::Completed { affected: 1 });
        assert!(report.is_clean());
        assert_eq!(store.keys().unwrap(), vec!["auth_token".to_string()]);
    }

    #[test]
    fn test_failing_step_does_not_abort_later_steps() {
        let clock = Arc::new(ManualClock::new());
        let tasks = Arc::new(TaskRegistry::new());
        let store = Arc::new(FailingStore::new());
        store.set_failing(true);
        let target = Arc::new(Target {
            fail: true,
            ..Default::default()
        });

        let recovery = recovery(&clock, &tasks)
            .with_store(store)
            .with_target(target.clone());
        let report = recovery.run("faults");

        assert_eq!(report.failed_steps().count(), 2);
        assert_eq!(target.resets.load(Ordering::SeqCst), 1);
        assert_eq!(
            report.steps[2].outcome,
            StepOutcome::Completed { affected: 0 }
        );
    }

    #[test]
    fn test_rewarm_runs_after_delay() {
        let clock = Arc::new(ManualClock::new());
        let tasks = Arc::new(TaskRegistry::new());
        let target = Arc::new(Target::default());
        let recovery = recovery(&clock, &tasks).with_target(target.clone());

        recovery.run("first");
        clock.advance(Duration::from_millis(1_999));
        assert_eq!(target.rewarms.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_millis(1));
        assert_eq!(target.rewarms.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pending_rewarm_is_replaced() {
        let clock = Arc::new(ManualClock::new());
        let tasks = Arc::new(TaskRegistry::new());
        let target = Arc::new(Target::default());
        let recovery = recovery(&clock, &tasks).with_target(target.clone());

        recovery.run("first");
        clock.advance(Duration::from_secs(1));
        recovery.run("second");
        clock.advance(Duration::from_secs(5));

        assert_eq!(target.rewarms.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let clock = Arc::new(ManualClock::new());
        let tasks = Arc::new(TaskRegistry::new());
        let throttle = Arc::new(ThrottledLogger::new(clock.clone(), Duration::from_secs(60)));
        let recovery = EmergencyRecovery::new(
            clock.clone(),
            RecoveryConfig {
                history_limit: 3,
                ..Default::default()
            },
            tasks,
            throttle,
        );

        for i in 0..5 {
            recovery.run(&format!("run {}", i));
        }

        let history = recovery.recovery_history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].reason, "run 2");
        assert_eq!(recovery.last_report().unwrap().reason, "run 4");
    }
}
