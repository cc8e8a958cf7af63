//! Failure containment and self-healing
//!
//! - Circuit breakers gating retries
//! - Single-flight shared resource lifecycle
//! - Safety lock, stability monitoring and emergency recovery
//! - Panic reporting through tracing

pub mod circuit_breaker;
pub mod panic;
pub mod recovery;
pub mod safety_lock;
pub mod singleton;
pub mod stability;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitState};
pub use panic::install_panic_handler;
pub use recovery::{
    EmergencyRecovery, RecoveryReport, RecoveryStep, ResetTarget, StepOutcome, StepReport,
};
pub use safety_lock::{LockToken, SafetyLock};
pub use singleton::{ManagedResource, ResourceFactory, SingletonResourceManager, SingletonStatus};
pub use stability::{
    ActivationOutcome, StabilityMonitor, StabilityRecord, SuppressReason,
};
