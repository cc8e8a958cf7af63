//! Shared value types for supervisor state
//!
//! Small `Copy` enums and plain snapshots passed between components and
//! handed out to callers. None of them carry behaviour beyond derivation.

use serde::Serialize;
use std::fmt;

/// Derived system stability level
///
/// Recomputed by the stability monitor from recent emergency activations.
/// Callers never set it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum SystemStability {
    /// No recent activations
    Stable = 0,
    /// Activations inside the stability window
    Unstable = 1,
    /// Activations clustered inside the critical window
    Critical = 2,
}

impl From<u8> for SystemStability {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Stable,
            1 => Self::Unstable,
            2 => Self::Critical,
            _ => Self::Critical,
        }
    }
}

impl SystemStability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Unstable => "unstable",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for SystemStability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse health indicator shown to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HealthStatus {
    /// Normal operation
    Healthy,
    /// Safe mode or recent instability
    Degraded,
    /// Faults are clustering
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time health summary for dashboards
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// 0..=100, 100 meaning fully healthy
    pub score: u8,
    pub stability: SystemStability,
    pub safe_mode: bool,
    pub emergency_active: bool,
    pub activation_count: u64,
    pub sync_breaker_open: bool,
    pub live_resources: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stability_ordering() {
        assert!(SystemStability::Stable < SystemStability::Unstable);
        assert!(SystemStability::Unstable < SystemStability::Critical);
    }

    #[test]
    fn test_stability_from_u8() {
        assert_eq!(SystemStability::from(0), SystemStability::Stable);
        assert_eq!(SystemStability::from(1), SystemStability::Unstable);
        assert_eq!(SystemStability::from(2), SystemStability::Critical);
        // Unknown values are treated as the worst case
        assert_eq!(SystemStability::from(9), SystemStability::Critical);
    }

    #[test]
    fn test_health_report_serializes() {
        let report = HealthReport {
            status: HealthStatus::Degraded,
            score: 65,
            stability: SystemStability::Unstable,
            safe_mode: true,
            emergency_active: false,
            activation_count: 1,
            sync_breaker_open: true,
            live_resources: 0,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"score\":65"));
        assert!(json.contains("\"Unstable\""));
    }
}
