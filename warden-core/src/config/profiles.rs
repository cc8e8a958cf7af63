//! Configuration profiles for different environments
//!
//! Provides pre-configured profiles for:
//! - Development: short windows so breaker and recovery behaviour shows up quickly
//! - Production: the long-standing defaults
//! - Testing: automatic timers disabled, everything driven explicitly

use super::types::*;

/// Configuration profile name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileName {
    /// Development profile (local runs)
    Development,
    /// Production profile
    Production,
    /// Testing profile (no background timers)
    Testing,
}

impl ProfileName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Testing => "testing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Some(Self::Development),
            "prod" | "production" => Some(Self::Production),
            "test" | "testing" => Some(Self::Testing),
            _ => None,
        }
    }
}

/// Configuration profile with environment-specific defaults
pub struct ConfigProfile;

impl ConfigProfile {
    /// Create a development configuration
    ///
    /// - Sync every 5s, breaker cooldown 20s
    /// - Stability check every 15s over a 60s window
    /// - Debug logging, 5s throttle window
    pub fn development() -> SupervisorConfig {
        SupervisorConfig {
            sync: SyncConfig {
                min_interval_secs: 2,
                max_attempts_per_session: 50,
                timeout_secs: 3,
                period_secs: 5,
                ..Default::default()
            },
            sync_breaker: BreakerSettings {
                failure_threshold: 2,
                cooldown_secs: 20,
            },
            system_breaker: BreakerSettings {
                failure_threshold: 2,
                cooldown_secs: 10,
            },
            stability: StabilityConfig {
                fault_threshold: 5,
                activation_cooldown_secs: 10,
                safety_lock_secs: 5,
                check_period_secs: 15,
                stability_window_secs: 60,
                critical_window_secs: 30,
                critical_activations: 3,
            },
            recovery: RecoveryConfig {
                rewarm_delay_ms: 500,
                ..Default::default()
            },
            logging: LoggingConfig {
                log_level: "debug".to_string(),
                json_logs: false,
                throttle_window_secs: 5,
            },
            ..Default::default()
        }
    }

    /// Create a production configuration (the defaults, JSON logs)
    pub fn production() -> SupervisorConfig {
        SupervisorConfig {
            logging: LoggingConfig {
                json_logs: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create a testing configuration
    ///
    /// Periodic ticks are disabled; tests call `sync_all` and
    /// `perform_stability_check` themselves.
    pub fn testing() -> SupervisorConfig {
        SupervisorConfig {
            sync: SyncConfig {
                period_secs: 0,
                ..Default::default()
            },
            stability: StabilityConfig {
                check_period_secs: 0,
                ..Default::default()
            },
            resource: ResourceConfig {
                warm_on_start: false,
            },
            ..Default::default()
        }
    }

    /// Get configuration by profile name
    pub fn get(profile: ProfileName) -> SupervisorConfig {
        match profile {
            ProfileName::Development => Self::development(),
            ProfileName::Production => Self::production(),
            ProfileName::Testing => Self::testing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_name_parsing() {
        assert_eq!(ProfileName::from_str("dev"), Some(ProfileName::Development));
        assert_eq!(ProfileName::from_str("PRODUCTION"), Some(ProfileName::Production));
        assert_eq!(ProfileName::from_str("test"), Some(ProfileName::Testing));
        assert_eq!(ProfileName::from_str("staging"), None);
    }

    #[test]
    fn test_all_profiles_validate() {
        for profile in [
            ProfileName::Development,
            ProfileName::Production,
            ProfileName::Testing,
        ] {
            let config = ConfigProfile::get(profile);
            assert!(
                config.validate().is_ok(),
                "{} profile failed validation",
                profile.as_str()
            );
        }
    }

    #[test]
    fn test_testing_profile_disables_timers() {
        let config = ConfigProfile::testing();
        assert!(config.sync.period().is_none());
        assert!(config.stability.check_period().is_none());
        assert!(!config.resource.warm_on_start);
    }

    #[test]
    fn test_production_uses_json_logs() {
        assert!(ConfigProfile::production().logging.json_logs);
    }
}
