//! Default thresholds and windows
//!
//! These values were hard-coded in the system this supervisor replaces. They
//! have no documented derivation and are kept as defaults only; every one of
//! them can be overridden through [`super::SupervisorConfig`].

// ===== SYNC COORDINATOR =====

/// Minimum time between two sync attempts (seconds)
pub const SYNC_MIN_INTERVAL_SECS: u64 = 30;

/// Attempt budget per session before a manual reset is required
pub const SYNC_MAX_ATTEMPTS_PER_SESSION: u32 = 10;

/// Overall timeout for one sync pass across all modules (seconds)
pub const SYNC_TIMEOUT_SECS: u64 = 30;

/// Period of the automatic sync tick (seconds)
pub const SYNC_PERIOD_SECS: u64 = 60;

/// Error messages retained per session
pub const SYNC_MAX_RECORDED_ERRORS: usize = 20;

// ===== CIRCUIT BREAKERS =====

/// Consecutive failures that open the sync breaker
pub const SYNC_BREAKER_THRESHOLD: u32 = 2;

/// Sync breaker cooldown: 5 minutes
pub const SYNC_BREAKER_COOLDOWN_SECS: u64 = 300;

/// Escalations that open the system-fault breaker
pub const SYSTEM_BREAKER_THRESHOLD: u32 = 3;

/// System-fault breaker cooldown (seconds)
pub const SYSTEM_BREAKER_COOLDOWN_SECS: u64 = 30;

// ===== STABILITY MONITOR =====

/// Fault signals tolerated before escalating to emergency mode
pub const FAULT_SIGNAL_THRESHOLD: u32 = 20;

/// Minimum time between two emergency activations (seconds)
pub const ACTIVATION_COOLDOWN_SECS: u64 = 30;

/// How long the safety lock stays held after an activation (seconds)
pub const SAFETY_LOCK_HOLD_SECS: u64 = 10;

/// Period of the stability check: 2 minutes
pub const STABILITY_CHECK_PERIOD_SECS: u64 = 120;

/// Lookback for "any recent activation" (seconds)
pub const STABILITY_WINDOW_SECS: u64 = 600;

/// Lookback for clustered activations (seconds)
pub const CRITICAL_WINDOW_SECS: u64 = 300;

/// Activations inside the critical window that mark the system critical
pub const CRITICAL_ACTIVATIONS: u32 = 3;

// ===== RECOVERY =====

/// Storage keys that survive a transient-state purge (substring match)
pub const PRESERVED_STORAGE_KEYS: [&str; 3] = ["auth_token", "user_preferences", "session_id"];

/// Delay before a reset resource is rebuilt (milliseconds)
pub const REWARM_DELAY_MS: u64 = 2_000;

/// Recovery reports retained in history
pub const RECOVERY_HISTORY_LIMIT: usize = 50;

// ===== LOGGING & LIFECYCLE =====

/// Window for throttled diagnostics (seconds)
pub const LOG_THROTTLE_WINDOW_SECS: u64 = 60;

/// Upper bound for shutdown and unload hooks (milliseconds)
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_lock_shorter_than_cooldown() {
        assert!(SAFETY_LOCK_HOLD_SECS <= ACTIVATION_COOLDOWN_SECS);
    }

    #[test]
    fn test_critical_window_inside_stability_window() {
        assert!(CRITICAL_WINDOW_SECS <= STABILITY_WINDOW_SECS);
    }

    #[test]
    fn test_sync_breaker_stricter_than_system_breaker() {
        assert!(SYNC_BREAKER_THRESHOLD < SYSTEM_BREAKER_THRESHOLD);
    }
}
