pub mod constants;
pub mod profiles;
pub mod types;

pub use profiles::{ConfigProfile, ProfileName};
pub use types::*;

use anyhow::{Context, Result};
use ::config::{Config as ConfigLoader, Environment, File};
use std::path::Path;

impl SupervisorConfig {
    /// Load configuration from file with optional environment variable overrides
    ///
    /// Missing sections and fields fall back to the defaults in
    /// [`constants`]. Environment variables use the `WARDEN__` prefix with
    /// `__` as the section separator, e.g. `WARDEN__SYNC__TIMEOUT_SECS=10`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref();

        let config = ConfigLoader::builder()
            // Load from TOML file
            .add_source(File::from(config_path))
            // Override with environment variables (WARDEN__)
            .add_source(Environment::with_prefix("WARDEN").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        // Deserialize into SupervisorConfig struct
        let cfg: SupervisorConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        cfg.validate()?;

        Ok(cfg)
    }

    /// Load from default location (./config/warden.toml)
    pub fn load_default() -> Result<Self> {
        Self::load("config/warden.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Breakers
        for (name, breaker) in [
            ("sync_breaker", &self.sync_breaker),
            ("system_breaker", &self.system_breaker),
        ] {
            if breaker.failure_threshold == 0 {
                anyhow::bail!("{}.failure_threshold must be positive", name);
            }
            if breaker.cooldown_secs == 0 {
                anyhow::bail!("{}.cooldown_secs must be positive", name);
            }
        }

        // Sync coordinator
        if self.sync.max_attempts_per_session == 0 {
            anyhow::bail!("sync.max_attempts_per_session must be positive");
        }

        if self.sync.timeout_secs == 0 {
            anyhow::bail!("sync.timeout_secs must be positive");
        }

        // Stability monitor
        if self.stability.fault_threshold == 0 {
            anyhow::bail!("stability.fault_threshold must be positive");
        }

        if self.stability.critical_activations == 0 {
            anyhow::bail!("stability.critical_activations must be positive");
        }

        if self.stability.safety_lock_secs > self.stability.activation_cooldown_secs {
            anyhow::bail!(
                "stability.safety_lock_secs ({}) cannot exceed activation_cooldown_secs ({})",
                self.stability.safety_lock_secs,
                self.stability.activation_cooldown_secs
            );
        }

        if self.stability.critical_window_secs > self.stability.stability_window_secs {
            anyhow::bail!("stability.critical_window_secs cannot exceed stability_window_secs");
        }

        if self.recovery.history_limit == 0 {
            anyhow::bail!("recovery.history_limit must be positive");
        }

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}', must be one of: {:?}",
                self.logging.log_level,
                valid_log_levels
            );
        }

        Ok(())
    }
}
