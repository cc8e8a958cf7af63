//! Common utilities for all binaries
//!
//! Shared CLI parsing, configuration selection and reporting.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use warden_core::config::{ConfigProfile, ProfileName, SupervisorConfig};
use warden_core::{HealthReport, Supervisor};

/// Common CLI arguments for all binaries
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// TOML config file; overrides --profile
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Built-in profile: development, production or testing
    #[arg(short, long, default_value = "development")]
    pub profile: String,

    /// Log level (overrides the config)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit JSON logs (overrides the config)
    #[arg(long)]
    pub json_logs: bool,

    /// Print the Prometheus metrics on exit
    #[arg(long)]
    pub metrics: bool,
}

impl CommonArgs {
    /// Resolve the supervisor configuration from the file or profile
    pub fn load_config(&self) -> Result<SupervisorConfig> {
        let mut config = match &self.config {
            Some(path) => SupervisorConfig::load(path)?,
            None => {
                let profile = ProfileName::from_str(&self.profile)
                    .ok_or_else(|| anyhow!("Unknown profile '{}'", self.profile))?;
                ConfigProfile::get(profile)
            }
        };

        if let Some(level) = &self.log_level {
            config.logging.log_level = level.clone();
        }
        if self.json_logs {
            config.logging.json_logs = true;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Initialize tracing/logging from the resolved configuration
pub fn init_logging(config: &SupervisorConfig) -> Result<()> {
    warden_core::utils::init_logger(&config.logging.log_level, config.logging.json_logs)
}

/// Log a health report
pub fn print_health(health: &HealthReport) {
    info!("=== Health ===");
    info!("Status: {:?} (score {})", health.status, health.score);
    info!("Stability: {}", health.stability);
    info!(
        "Safe mode: {}, emergency active: {}",
        health.safe_mode, health.emergency_active
    );
    info!("Emergency activations: {}", health.activation_count);
    info!("Sync breaker open: {}", health.sync_breaker_open);
    info!("Live shared resources: {}", health.live_resources);
}

/// Log final statistics, and the metrics exposition when requested
pub fn print_stats(supervisor: &Supervisor, with_metrics: bool) -> Result<()> {
    let sync = supervisor.coordinator().status();
    info!("=== Final Statistics ===");
    info!("Successful syncs: {}", sync.successful_syncs);
    info!(
        "Session attempts: {}/{}",
        sync.attempts_this_session, sync.max_attempts_per_session
    );
    info!("Recorded sync errors: {}", sync.errors.len());
    info!("Recovery runs: {}", supervisor.recovery_history().len());
    print_health(&supervisor.health());

    if with_metrics {
        let text = supervisor.metrics().render()?;
        println!("{}", text);
    }
    Ok(())
}
