//! Sync coordinator integration tests
//!
//! Drives `SyncCoordinator` through a fully wired supervisor on a manual clock.
//! Verifies:
//! - Only one pass runs at a time
//! - A hung pass times out, cancels module work and counts as one failure
//! - The breaker trips, cools down and probes exactly once
//! - Repeated breaker trips escalate to emergency mode
//! - The session budget and minimum interval gate new passes
//! - Panicking modules and cancelled passes still settle the breaker

use std::sync::Arc;
use std::time::Duration;
use warden_core::config::ConfigProfile;
use warden_core::resilience::CircuitState;
use warden_core::sync::{RejectReason, SyncOutcome};
use warden_core::testing::{
    advance_and_settle, manual_supervisor_builder, manual_supervisor_builder_with, settle,
    HangingModule, PanickingModule, ScriptedModule,
};

#[cfg(test)]
mod single_flight {
    use super::*;

    /// Test: a second pass is rejected while the first is in flight
    #[tokio::test]
    async fn test_concurrent_sync_is_rejected() {
        let (clock, builder) = manual_supervisor_builder();
        let hanging = Arc::new(HangingModule::new("leaderboard"));
        let supervisor = builder.module(hanging.clone()).build().unwrap();
        let coordinator = Arc::clone(supervisor.coordinator());

        let first = coordinator.trigger().expect("runtime available");
        settle().await;
        assert!(coordinator.is_syncing());
        assert_eq!(hanging.started(), 1);

        let second = coordinator.sync_all().await;
        assert_eq!(second, SyncOutcome::Rejected(RejectReason::InFlight));
        assert_eq!(hanging.started(), 1, "rejected pass must not touch modules");

        advance_and_settle(&clock, Duration::from_secs(30)).await;
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Failed { timed_out: true, .. }));
        assert!(!coordinator.is_syncing());
    }

    /// Test: the in-flight flag is cleared after a timeout so the next pass runs
    #[tokio::test]
    async fn test_flag_cleared_after_timeout() {
        let (clock, builder) = manual_supervisor_builder();
        let hanging = Arc::new(HangingModule::new("quiz"));
        let supervisor = builder.module(hanging.clone()).build().unwrap();
        let coordinator = Arc::clone(supervisor.coordinator());

        let handle = coordinator.trigger().unwrap();
        settle().await;
        advance_and_settle(&clock, Duration::from_secs(30)).await;
        handle.await.unwrap();

        let handle = coordinator.trigger().unwrap();
        settle().await;
        assert_eq!(hanging.started(), 2);
        assert!(coordinator.is_syncing());

        advance_and_settle(&clock, Duration::from_secs(30)).await;
        handle.await.unwrap();
    }
}

#[cfg(test)]
mod timeout {
    use super::*;

    /// Test: timing out drops every pending module future
    #[tokio::test]
    async fn test_timeout_cancels_module_work() {
        let (clock, builder) = manual_supervisor_builder();
        let hanging = Arc::new(HangingModule::new("social"));
        let healthy = Arc::new(ScriptedModule::always_ok("profile"));
        let supervisor = builder
            .module(hanging.clone())
            .module(healthy.clone())
            .build()
            .unwrap();
        let coordinator = Arc::clone(supervisor.coordinator());

        let handle = coordinator.trigger().unwrap();
        settle().await;
        assert_eq!(hanging.cancelled(), 0);

        advance_and_settle(&clock, Duration::from_secs(29)).await;
        assert!(coordinator.is_syncing(), "must not time out early");

        advance_and_settle(&clock, Duration::from_secs(1)).await;
        match handle.await.unwrap() {
            SyncOutcome::Failed {
                errors,
                timed_out,
                escalated,
            } => {
                assert!(timed_out);
                assert!(!escalated);
                assert_eq!(errors.len(), 1);
            }
            other => panic!("expected timeout, got {:?}", other),
        }

        assert_eq!(hanging.cancelled(), 1);
        assert_eq!(healthy.calls(), 1);
        assert_eq!(coordinator.breaker().failure_count(), 1);
    }
}

#[cfg(test)]
mod breaker {
    use super::*;

    /// Test: two failures open the breaker, later calls are gated until cooldown
    #[tokio::test]
    async fn test_breaker_trips_and_recovers() {
        let (clock, builder) = manual_supervisor_builder();
        let module = Arc::new(ScriptedModule::always_failing("quiz"));
        let supervisor = builder.module(module.clone()).build().unwrap();
        let coordinator = Arc::clone(supervisor.coordinator());

        assert!(matches!(
            coordinator.sync_all().await,
            SyncOutcome::Failed { escalated: false, .. }
        ));
        assert!(matches!(
            coordinator.sync_all().await,
            SyncOutcome::Failed { escalated: true, .. }
        ));
        assert_eq!(coordinator.breaker().state(), CircuitState::Open);

        assert_eq!(
            coordinator.sync_all().await,
            SyncOutcome::Rejected(RejectReason::BreakerOpen)
        );
        assert_eq!(module.calls(), 2);

        // Breaker escalation puts the supervisor in safe mode
        assert!(supervisor.monitor().is_safe_mode());
        assert!(!supervisor.monitor().is_emergency_active());

        advance_and_settle(&clock, Duration::from_secs(300)).await;
        module.set_healthy(true);

        assert!(coordinator.sync_all().await.is_success());
        assert_eq!(coordinator.breaker().state(), CircuitState::Closed);
        assert_eq!(coordinator.breaker().failure_count(), 0);
    }

    /// Test: a failed half-open probe reopens the breaker for a full cooldown
    #[tokio::test]
    async fn test_failed_probe_reopens() {
        let (clock, builder) = manual_supervisor_builder();
        let module = Arc::new(ScriptedModule::always_failing("quiz"));
        let supervisor = builder.module(module.clone()).build().unwrap();
        let coordinator = Arc::clone(supervisor.coordinator());

        coordinator.sync_all().await;
        coordinator.sync_all().await;
        advance_and_settle(&clock, Duration::from_secs(300)).await;

        assert!(matches!(
            coordinator.sync_all().await,
            SyncOutcome::Failed { escalated: true, .. }
        ));
        assert_eq!(coordinator.breaker().trip_count(), 2);

        advance_and_settle(&clock, Duration::from_secs(299)).await;
        assert_eq!(
            coordinator.sync_all().await,
            SyncOutcome::Rejected(RejectReason::BreakerOpen)
        );
    }

    /// Test: three sync breaker trips trip the system breaker and activate emergency mode
    #[tokio::test]
    async fn test_repeated_trips_escalate_to_emergency() {
        let (clock, builder) = manual_supervisor_builder();
        let module = Arc::new(ScriptedModule::always_failing("quiz"));
        let supervisor = builder.module(module.clone()).build().unwrap();
        let coordinator = Arc::clone(supervisor.coordinator());

        coordinator.sync_all().await;
        coordinator.sync_all().await;
        assert_eq!(supervisor.health().activation_count, 0);

        advance_and_settle(&clock, Duration::from_secs(300)).await;
        coordinator.sync_all().await;
        assert_eq!(supervisor.health().activation_count, 0);

        advance_and_settle(&clock, Duration::from_secs(300)).await;
        coordinator.sync_all().await;

        let health = supervisor.health();
        assert_eq!(health.activation_count, 1);
        assert!(health.emergency_active);
        assert!(health.safe_mode);
        assert!(health.sync_breaker_open);
        assert_eq!(supervisor.recovery_history().len(), 1);
    }
}

#[cfg(test)]
mod gating {
    use super::*;

    /// Test: the session budget stops passes until the session is reset
    #[tokio::test]
    async fn test_budget_exhaustion_and_reset() {
        let mut config = ConfigProfile::testing();
        config.sync.max_attempts_per_session = 3;
        config.sync_breaker.failure_threshold = 100;
        let (_clock, builder) = manual_supervisor_builder_with(config);
        let module = Arc::new(ScriptedModule::always_failing("quiz"));
        let supervisor = builder.module(module.clone()).build().unwrap();
        let coordinator = Arc::clone(supervisor.coordinator());

        for _ in 0..3 {
            assert!(matches!(
                coordinator.sync_all().await,
                SyncOutcome::Failed { .. }
            ));
        }
        assert_eq!(
            coordinator.sync_all().await,
            SyncOutcome::Rejected(RejectReason::BudgetExhausted)
        );
        assert_eq!(module.calls(), 3);

        let status = coordinator.status();
        assert_eq!(status.attempts_this_session, 3);
        assert_eq!(status.errors.len(), 3);

        coordinator.reset_session();
        assert_eq!(coordinator.status().attempts_this_session, 0);
        assert_eq!(coordinator.breaker().failure_count(), 0);

        module.set_healthy(true);
        assert!(coordinator.sync_all().await.is_success());
    }

    /// Test: a pass within the minimum interval of the last success is rejected
    #[tokio::test]
    async fn test_min_interval_after_success() {
        let (clock, builder) = manual_supervisor_builder();
        let supervisor = builder
            .module(Arc::new(ScriptedModule::always_ok("quiz")))
            .module(Arc::new(ScriptedModule::always_ok("social")))
            .build()
            .unwrap();
        let coordinator = Arc::clone(supervisor.coordinator());

        match coordinator.sync_all().await {
            SyncOutcome::Succeeded { modules, .. } => assert_eq!(modules, 2),
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(
            coordinator.sync_all().await,
            SyncOutcome::Rejected(RejectReason::TooSoon)
        );

        advance_and_settle(&clock, Duration::from_secs(30)).await;
        assert!(coordinator.sync_all().await.is_success());

        let status = coordinator.status();
        assert_eq!(status.successful_syncs, 2);
        assert_eq!(status.modules_synced, 2);
        assert_eq!(status.attempts_this_session, 2);
    }

    /// Test: a successful probe after cooldown closes the breaker
    #[tokio::test]
    async fn test_probe_success_closes_breaker() {
        let (clock, builder) = manual_supervisor_builder();
        let module = Arc::new(ScriptedModule::new("quiz", [true, false, false], true));
        let supervisor = builder.module(module.clone()).build().unwrap();
        let coordinator = Arc::clone(supervisor.coordinator());

        assert!(coordinator.sync_all().await.is_success());
        advance_and_settle(&clock, Duration::from_secs(30)).await;
        coordinator.sync_all().await;
        coordinator.sync_all().await;
        assert_eq!(coordinator.breaker().state(), CircuitState::Open);

        advance_and_settle(&clock, Duration::from_secs(300)).await;
        assert!(!coordinator.breaker().is_open());

        assert!(coordinator.sync_all().await.is_success());
        assert_eq!(coordinator.breaker().state(), CircuitState::Closed);
    }
}

#[cfg(test)]
mod unsettled_passes {
    use super::*;

    /// Test: a panicking module fails the pass and trips the breaker like any failure
    #[tokio::test]
    async fn test_panicking_module_trips_breaker() {
        let (_clock, builder) = manual_supervisor_builder();
        let module = Arc::new(PanickingModule::new("social"));
        let supervisor = builder
            .module(module.clone())
            .module(Arc::new(ScriptedModule::always_ok("quiz")))
            .build()
            .unwrap();
        let coordinator = Arc::clone(supervisor.coordinator());

        for _ in 0..2 {
            assert!(matches!(
                coordinator.sync_all().await,
                SyncOutcome::Failed { timed_out: false, .. }
            ));
            assert!(!coordinator.is_syncing());
        }
        assert_eq!(coordinator.breaker().state(), CircuitState::Open);
        assert!(supervisor.monitor().is_safe_mode());

        assert_eq!(
            coordinator.sync_all().await,
            SyncOutcome::Rejected(RejectReason::BreakerOpen)
        );
        assert_eq!(module.calls(), 2);

        let status = coordinator.status();
        assert_eq!(status.attempts_this_session, 2);
        assert!(status.errors.iter().all(|e| e.contains("panicked")));
    }

    /// Test: cancelling the task that holds the half-open probe reopens the breaker
    #[tokio::test]
    async fn test_cancelled_probe_does_not_wedge_coordinator() {
        let (clock, builder) = manual_supervisor_builder();
        let hanging = Arc::new(HangingModule::new("leaderboard"));
        let supervisor = builder.module(hanging.clone()).build().unwrap();
        let coordinator = Arc::clone(supervisor.coordinator());

        coordinator.breaker().record_failure();
        coordinator.breaker().record_failure();
        advance_and_settle(&clock, Duration::from_secs(300)).await;

        let probe = coordinator.trigger().expect("runtime available");
        settle().await;
        assert_eq!(coordinator.breaker().state(), CircuitState::HalfOpen);

        probe.abort();
        assert!(probe.await.unwrap_err().is_cancelled());
        assert_eq!(hanging.cancelled(), 1);
        assert!(!coordinator.is_syncing());
        assert_eq!(coordinator.breaker().state(), CircuitState::Open);
        assert!(supervisor.monitor().is_safe_mode());

        // Next cooldown: a new pass gets the probe and resolves through the timeout
        advance_and_settle(&clock, Duration::from_secs(300)).await;
        let retry = coordinator.trigger().expect("runtime available");
        settle().await;
        assert!(coordinator.is_syncing());
        assert_eq!(hanging.started(), 2);

        advance_and_settle(&clock, Duration::from_secs(30)).await;
        assert!(matches!(
            retry.await.unwrap(),
            SyncOutcome::Failed { timed_out: true, .. }
        ));
        assert_eq!(coordinator.breaker().trip_count(), 3);
    }
}
