use super::constants::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default = "BreakerSettings::sync_default")]
    pub sync_breaker: BreakerSettings,
    #[serde(default = "BreakerSettings::system_default")]
    pub system_breaker: BreakerSettings,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub resource: ResourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Sync coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Minimum time between attempts
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,

    /// Attempt budget per session
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_session: u32,

    /// Overall timeout for one pass
    #[serde(default = "default_sync_timeout")]
    pub timeout_secs: u64,

    /// Period of the automatic tick (0 disables it)
    #[serde(default = "default_sync_period")]
    pub period_secs: u64,

    /// Error messages kept in the session
    #[serde(default = "default_max_errors")]
    pub max_recorded_errors: usize,
}

impl SyncConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn period(&self) -> Option<Duration> {
        (self.period_secs > 0).then(|| Duration::from_secs(self.period_secs))
    }
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures before opening
    pub failure_threshold: u32,

    /// How long the breaker stays open before a half-open probe
    pub cooldown_secs: u64,
}

impl BreakerSettings {
    pub fn sync_default() -> Self {
        Self {
            failure_threshold: SYNC_BREAKER_THRESHOLD,
            cooldown_secs: SYNC_BREAKER_COOLDOWN_SECS,
        }
    }

    pub fn system_default() -> Self {
        Self {
            failure_threshold: SYSTEM_BREAKER_THRESHOLD,
            cooldown_secs: SYSTEM_BREAKER_COOLDOWN_SECS,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Stability monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Fault signals before escalation
    #[serde(default = "default_fault_threshold")]
    pub fault_threshold: u32,

    /// Minimum spacing between emergency activations
    #[serde(default = "default_activation_cooldown")]
    pub activation_cooldown_secs: u64,

    /// Safety lock hold time after an activation
    #[serde(default = "default_safety_lock")]
    pub safety_lock_secs: u64,

    /// Period of the stability check (0 disables it)
    #[serde(default = "default_check_period")]
    pub check_period_secs: u64,

    /// Any activation inside this window means "unstable"
    #[serde(default = "default_stability_window")]
    pub stability_window_secs: u64,

    /// Clustered activations are counted inside this window
    #[serde(default = "default_critical_window")]
    pub critical_window_secs: u64,

    /// Activations inside the critical window that mean "critical"
    #[serde(default = "default_critical_activations")]
    pub critical_activations: u32,
}

impl StabilityConfig {
    pub fn activation_cooldown(&self) -> Duration {
        Duration::from_secs(self.activation_cooldown_secs)
    }

    pub fn safety_lock(&self) -> Duration {
        Duration::from_secs(self.safety_lock_secs)
    }

    pub fn check_period(&self) -> Option<Duration> {
        (self.check_period_secs > 0).then(|| Duration::from_secs(self.check_period_secs))
    }

    pub fn stability_window(&self) -> Duration {
        Duration::from_secs(self.stability_window_secs)
    }

    pub fn critical_window(&self) -> Duration {
        Duration::from_secs(self.critical_window_secs)
    }
}

/// Recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Storage keys preserved by the purge step (substring match)
    #[serde(default = "default_preserved_keys")]
    pub preserved_keys: Vec<String>,

    /// Delay before reset resources are rebuilt
    #[serde(default = "default_rewarm_delay")]
    pub rewarm_delay_ms: u64,

    /// Recovery reports retained in history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl RecoveryConfig {
    pub fn rewarm_delay(&self) -> Duration {
        Duration::from_millis(self.rewarm_delay_ms)
    }
}

/// Shared resource configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Build registered resources when the supervisor starts
    #[serde(default = "default_true")]
    pub warm_on_start: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Window for throttled diagnostics
    #[serde(default = "default_throttle_window")]
    pub throttle_window_secs: u64,
}

impl LoggingConfig {
    pub fn throttle_window(&self) -> Duration {
        Duration::from_secs(self.throttle_window_secs)
    }
}

/// Lifecycle hook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Upper bound for shutdown and unload hooks
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

impl LifecycleConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

// Default value functions
fn default_min_interval() -> u64 {
    SYNC_MIN_INTERVAL_SECS
}

fn default_max_attempts() -> u32 {
    SYNC_MAX_ATTEMPTS_PER_SESSION
}

fn default_sync_timeout() -> u64 {
    SYNC_TIMEOUT_SECS
}

fn default_sync_period() -> u64 {
    SYNC_PERIOD_SECS
}

fn default_max_errors() -> usize {
    SYNC_MAX_RECORDED_ERRORS
}

fn default_fault_threshold() -> u32 {
    FAULT_SIGNAL_THRESHOLD
}

fn default_activation_cooldown() -> u64 {
    ACTIVATION_COOLDOWN_SECS
}

fn default_safety_lock() -> u64 {
    SAFETY_LOCK_HOLD_SECS
}

fn default_check_period() -> u64 {
    STABILITY_CHECK_PERIOD_SECS
}

fn default_stability_window() -> u64 {
    STABILITY_WINDOW_SECS
}

fn default_critical_window() -> u64 {
    CRITICAL_WINDOW_SECS
}

fn default_critical_activations() -> u32 {
    CRITICAL_ACTIVATIONS
}

fn default_preserved_keys() -> Vec<String> {
    PRESERVED_STORAGE_KEYS.iter().map(|k| k.to_string()).collect()
}

fn default_rewarm_delay() -> u64 {
    REWARM_DELAY_MS
}

fn default_history_limit() -> usize {
    RECOVERY_HISTORY_LIMIT
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_throttle_window() -> u64 {
    LOG_THROTTLE_WINDOW_SECS
}

fn default_shutdown_timeout() -> u64 {
    SHUTDOWN_TIMEOUT_MS
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            sync_breaker: BreakerSettings::sync_default(),
            system_breaker: BreakerSettings::system_default(),
            stability: StabilityConfig::default(),
            recovery: RecoveryConfig::default(),
            resource: ResourceConfig::default(),
            logging: LoggingConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval(),
            max_attempts_per_session: default_max_attempts(),
            timeout_secs: default_sync_timeout(),
            period_secs: default_sync_period(),
            max_recorded_errors: default_max_errors(),
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::sync_default()
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            fault_threshold: default_fault_threshold(),
            activation_cooldown_secs: default_activation_cooldown(),
            safety_lock_secs: default_safety_lock(),
            check_period_secs: default_check_period(),
            stability_window_secs: default_stability_window(),
            critical_window_secs: default_critical_window(),
            critical_activations: default_critical_activations(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            preserved_keys: default_preserved_keys(),
            rewarm_delay_ms: default_rewarm_delay(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            warm_on_start: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            throttle_window_secs: default_throttle_window(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: default_shutdown_timeout(),
        }
    }
}
