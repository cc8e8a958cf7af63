//! Circuit breaker pattern for preventing runaway retries
//!
//! Counts consecutive failures of a protected operation and, once a threshold
//! is reached, rejects further attempts until a cooldown expires. Implements
//! the three-state circuit breaker:
//! Closed (normal) → Open (tripped) → HalfOpen (one probe allowed)
//!
//! A failed probe reopens the breaker with a fresh cooldown. A successful
//! probe closes it and zeroes the failure count. Nothing that happens while
//! the cooldown is running shortens or extends it.

use crate::clock::Clock;
use crate::config::BreakerSettings;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CircuitState {
    /// Normal operation, attempts pass through
    Closed = 0,
    /// Circuit tripped, attempts are rejected
    Open = 1,
    /// Cooldown elapsed, a single probe is allowed
    HalfOpen = 2,
}

/// Configuration for circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Label used in logs and metrics
    pub name: &'static str,
    /// Consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// How long to stay Open before allowing a probe
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::sync()
    }
}

impl CircuitBreakerConfig {
    /// Synchronization path: trips after 2 failures, 5 minute cooldown
    pub fn sync() -> Self {
        Self::from_settings("sync", &BreakerSettings::sync_default())
    }

    /// Broader system faults: higher threshold, 30 second cooldown
    pub fn system() -> Self {
        Self::from_settings("system", &BreakerSettings::system_default())
    }

    pub fn from_settings(name: &'static str, settings: &BreakerSettings) -> Self {
        Self {
            name,
            failure_threshold: settings.failure_threshold.max(1),
            cooldown: settings.cooldown(),
        }
    }
}

/// Observable breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub consecutive_failures: u32,
    pub is_open: bool,
    pub opened_at: Option<Instant>,
    pub cooldown_until: Option<Instant>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    cooldown_until: Option<Instant>,
    /// Whether the single half-open probe has already been handed out
    probe_in_flight: bool,
    /// Times the breaker went to Open
    trips: u64,
}

/// Circuit breaker implementation
///
/// Cloning shares state.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        debug!("Creating circuit breaker with config: {:?}", config);
        Self {
            config,
            clock,
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                cooldown_until: None,
                probe_in_flight: false,
                trips: 0,
            })),
        }
    }

    /// Check if an attempt is allowed to proceed
    ///
    /// Once the cooldown has elapsed this moves the breaker to HalfOpen and
    /// lets exactly one caller through.
    pub fn can_attempt(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let expired = inner.cooldown_until.map_or(true, |until| now >= until);
                if expired {
                    debug!(breaker = self.config.name, "Circuit breaker transitioning to HALF-OPEN (probe allowed)");
                    inner.state = CircuitState::HalfOpen;
                    inner.cooldown_until = None;
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record successful operation
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                info!(breaker = self.config.name, "Circuit breaker probe succeeded - transitioning to CLOSED");
                Self::close(&mut inner);
            }
            CircuitState::Open => {
                // Late result from an attempt started before the trip; the
                // cooldown keeps running
            }
        }
    }

    /// Record failed operation
    ///
    /// Returns `true` when this failure moved the breaker to Open.
    pub fn record_failure(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.open(&mut inner, now);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in HalfOpen immediately reopens circuit
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                self.open(&mut inner, now);
                true
            }
            CircuitState::Open => {
                // Must not extend the running cooldown
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                false
            }
        }
    }

    fn open(&self, inner: &mut Inner, now: Instant) {
        warn!(
            breaker = self.config.name,
            failures = inner.consecutive_failures,
            cooldown_secs = self.config.cooldown.as_secs(),
            "Circuit breaker TRIPPED - transitioning to OPEN"
        );
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.cooldown_until = Some(now + self.config.cooldown);
        inner.probe_in_flight = false;
        inner.trips += 1;
    }

    fn close(inner: &mut Inner) {
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.cooldown_until = None;
        inner.probe_in_flight = false;
    }

    /// Get current state
    ///
    /// An Open breaker whose cooldown has elapsed still reports Open until
    /// the next `can_attempt`.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether attempts are currently being rejected
    pub fn is_open(&self) -> bool {
        let now = self.clock.now();
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open => inner.cooldown_until.map_or(false, |until| now < until),
            CircuitState::HalfOpen => inner.probe_in_flight,
            CircuitState::Closed => false,
        }
    }

    /// Snapshot of the breaker state
    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.inner.lock();
        CircuitBreakerState {
            consecutive_failures: inner.consecutive_failures,
            is_open: inner.state == CircuitState::Open,
            opened_at: inner.opened_at,
            cooldown_until: inner.cooldown_until,
        }
    }

    /// Get consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Times the breaker has tripped since creation
    pub fn trip_count(&self) -> u64 {
        self.inner.lock().trips
    }

    /// Remaining cooldown, if open
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open => inner
                .cooldown_until
                .map(|until| until.saturating_duration_since(now)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Reset circuit breaker to Closed state
    pub fn reset(&self) {
        info!(breaker = self.config.name, "Circuit breaker manually reset to CLOSED");
        Self::close(&mut self.inner.lock());
    }

    /// Force circuit breaker to Open state with a fresh cooldown
    pub fn force_open(&self) {
        warn!(breaker = self.config.name, "Circuit breaker manually forced to OPEN");
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.open(&mut inner, now);
    }
}
