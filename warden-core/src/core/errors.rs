//! Error types for supervisor operations
//!
//! Every public operation in this crate reports failure as a value. These
//! types name the failure classes the supervisor distinguishes:
//! - transient task failures (one module sync failing, a sync timeout)
//! - resource-denied failures (storage refusing an operation)
//! - invariant violations (an abandoned construction, bad configuration)

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a key-value store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The host environment refused the operation (quota, permissions, private mode)
    #[error("storage denied for key '{key}': {reason}")]
    Denied {
        /// Key involved in the rejected operation ("*" for whole-store operations)
        key: String,
        /// Reason reported by the backend
        reason: String,
    },

    /// The backend is not reachable at all
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Stored bytes could not be decoded
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}

impl StorageError {
    /// Convenience constructor for a denied operation on `key`
    pub fn denied(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::Denied {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by supervisor components
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    /// A registered module's sync task failed
    #[error("module '{module}' failed to sync: {reason}")]
    ModuleFailed {
        /// Module name as registered with the coordinator
        module: String,
        /// Failure description
        reason: String,
    },

    /// A registered module's sync task panicked
    #[error("module '{module}' panicked during sync: {message}")]
    ModulePanicked {
        /// Module name as registered with the coordinator
        module: String,
        /// Panic payload, when it was a string
        message: String,
    },

    /// The overall sync attempt did not finish in time
    #[error("sync attempt timed out after {0:?}")]
    SyncTimeout(Duration),

    /// The pass was dropped or unwound before recording an outcome
    #[error("sync attempt abandoned before completion")]
    SyncAbandoned,

    /// A shared resource could not be constructed
    #[error("resource construction failed: {0}")]
    ConstructionFailed(String),

    /// The resource was destroyed while its construction was still in flight
    #[error("resource construction abandoned: instances were destroyed mid-flight")]
    ConstructionAbandoned,

    /// Storage refused an operation
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SupervisorError {
    /// Shorthand for a failed module task
    pub fn module(module: impl Into<String>, reason: impl Into<String>) -> Self {
        SupervisorError::ModuleFailed {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Whether this failure is expected to clear on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SupervisorError::ModuleFailed { .. }
                | SupervisorError::SyncTimeout(_)
                | SupervisorError::ConstructionFailed(_)
        )
    }
}

/// Result alias used throughout the crate
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;
