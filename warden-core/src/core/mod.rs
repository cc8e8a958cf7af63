//! Core value types and errors shared by every supervisor component

pub mod errors;
pub mod types;

// Re-export commonly used types
pub use errors::{StorageError, SupervisorError, SupervisorResult};
pub use types::{HealthReport, HealthStatus, SystemStability};
