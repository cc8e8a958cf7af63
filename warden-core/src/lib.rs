//! Warden Core - Resilience Supervisor
//!
//! Warden keeps a long-running client process healthy. It contains failures
//! in its modules, rate-limits retries, manages shared resource lifecycle and
//! heals itself after fault storms.
//!
//! ## Architecture
//! - **Injected time**: every timer goes through [`clock::Clock`]
//! - **No process-wide singletons**: [`supervisor::Supervisor`] is the
//!   composition root and owns all components
//! - **Locks never held across `.await`**
//! - **Typed errors** in the library, `anyhow` only at the edges
//!
//! ## Core Modules
//! - `clock`: Clock trait, system/manual clocks, scheduled task registry
//! - `config`: Layered configuration (defaults, TOML, `WARDEN__` env)
//! - `core`: Error taxonomy and shared state types
//! - `resilience`: Circuit breakers, singleton manager, stability monitor, recovery
//! - `sync`: Breaker-gated cross-module synchronization
//! - `storage`: Key-value stores and degraded memory-only mode
//! - `monitoring`: Prometheus metrics
//! - `supervisor`: Composition root and lifecycle hooks
//! - `utils`: Logger setup and throttled logging

pub mod clock;
pub mod config;
pub mod core;
pub mod monitoring;
pub mod resilience;
pub mod storage;
pub mod supervisor;
pub mod sync;
pub mod testing;
pub mod utils;

// Re-export core types
pub use crate::core::{
    HealthReport, HealthStatus, StorageError, SupervisorError, SupervisorResult, SystemStability,
};

pub use crate::config::SupervisorConfig;
pub use crate::supervisor::{Supervisor, SupervisorBuilder};

/// Prelude for convenient imports
pub mod prelude {
    // Core types
    pub use crate::core::{
        HealthReport, HealthStatus, StorageError, SupervisorError, SupervisorResult,
        SystemStability,
    };

    // Composition root
    pub use crate::config::{ConfigProfile, SupervisorConfig};
    pub use crate::supervisor::{Supervisor, SupervisorBuilder};

    // Time
    pub use crate::clock::{Clock, ManualClock, SystemClock, TaskScope};

    // Components
    pub use crate::resilience::{
        ActivationOutcome, CircuitBreaker, CircuitBreakerConfig, ResourceFactory,
        SingletonResourceManager,
    };
    pub use crate::storage::{FileStore, KeyValueStore, MemoryStore};
    pub use crate::sync::{ModuleSync, SyncOutcome};
}
