//! Cross-module synchronization
//!
//! [`SyncCoordinator`] runs every registered [`ModuleSync`] under one overall
//! timeout, gated by a circuit breaker, a minimum interval and a per-session
//! attempt budget.

pub mod coordinator;
pub mod session;

pub use coordinator::{SyncCoordinator, SyncStatus};
pub use session::SyncSession;

use crate::core::SupervisorResult;
use async_trait::async_trait;
use std::time::Duration;

/// One application module that takes part in synchronization
#[async_trait]
pub trait ModuleSync: Send + Sync {
    fn name(&self) -> &str;

    async fn sync(&self) -> SupervisorResult<()>;
}

/// Why `sync_all` declined to start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Another pass is still running
    InFlight,
    /// Session budget used up; needs `reset_session`
    BudgetExhausted,
    /// Breaker is open
    BreakerOpen,
    /// Last successful sync was too recent
    TooSoon,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InFlight => "in_flight",
            Self::BudgetExhausted => "budget_exhausted",
            Self::BreakerOpen => "breaker_open",
            Self::TooSoon => "too_soon",
        }
    }
}

/// Result of one `sync_all` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Rejected(RejectReason),
    Succeeded {
        modules: usize,
        duration: Duration,
    },
    Failed {
        errors: Vec<String>,
        timed_out: bool,
        /// This failure tripped the breaker
        escalated: bool,
    },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}
