//! Throttled logging for fault storms
//!
//! Repeated diagnostics are keyed by a static message id. The first line for a
//! key is emitted, repeats inside the window are counted and dropped, and the
//! next emitted line reports how many were suppressed. `ERROR` always goes
//! through immediately.

use crate::clock::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn, Level};

#[derive(Debug, Clone, Copy)]
struct KeyState {
    last_emitted: Instant,
    suppressed: u64,
}

/// Rate-limited front end over `tracing`
pub struct ThrottledLogger {
    clock: Arc<dyn Clock>,
    window: Duration,
    keys: Mutex<HashMap<&'static str, KeyState>>,
    suppressed_total: AtomicU64,
}

impl ThrottledLogger {
    pub fn new(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            clock,
            window,
            keys: Mutex::new(HashMap::new()),
            suppressed_total: AtomicU64::new(0),
        }
    }

    /// Log `message` under `key`, returns whether the line was emitted
    pub fn log(&self, level: Level, key: &'static str, message: impl fmt::Display) -> bool {
        let now = self.clock.now();

        let suppressed = {
            let mut keys = self.keys.lock();
            match keys.get_mut(key) {
                Some(state)
                    if level != Level::ERROR
                        && now.saturating_duration_since(state.last_emitted) < self.window =>
                {
                    state.suppressed += 1;
                    self.suppressed_total.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
                Some(state) => {
                    let suppressed = state.suppressed;
                    state.suppressed = 0;
                    state.last_emitted = now;
                    suppressed
                }
                None => {
                    keys.insert(
                        key,
                        KeyState {
                            last_emitted: now,
                            suppressed: 0,
                        },
                    );
                    0
                }
            }
        };

        match level {
            Level::ERROR => error!(key, suppressed, "{}", message),
            Level::WARN => warn!(key, suppressed, "{}", message),
            Level::INFO => info!(key, suppressed, "{}", message),
            Level::DEBUG => debug!(key, suppressed, "{}", message),
            _ => trace!(key, suppressed, "{}", message),
        }
        true
    }

    pub fn error(&self, key: &'static str, message: impl fmt::Display) -> bool {
        self.log(Level::ERROR, key, message)
    }

    pub fn warn(&self, key: &'static str, message: impl fmt::Display) -> bool {
        self.log(Level::WARN, key, message)
    }

    pub fn info(&self, key: &'static str, message: impl fmt::Display) -> bool {
        self.log(Level::INFO, key, message)
    }

    pub fn debug(&self, key: &'static str, message: impl fmt::Display) -> bool {
        self.log(Level::DEBUG, key, message)
    }

    /// Lines dropped since creation, across all keys
    pub fn suppressed_total(&self) -> u64 {
        self.suppressed_total.load(Ordering::Relaxed)
    }

    /// Lines currently held back for `key`
    pub fn pending_suppressed(&self, key: &'static str) -> u64 {
        self.keys.lock().get(key).map_or(0, |s| s.suppressed)
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn logger(window_secs: u64) -> (Arc<ManualClock>, ThrottledLogger) {
        let clock = Arc::new(ManualClock::new());
        let logger = ThrottledLogger::new(clock.clone(), Duration::from_secs(window_secs));
        (clock, logger)
    }

    #[test]
    fn test_first_line_always_emitted() {
        let (_clock, logger) = logger(60);
        assert!(logger.warn("storage.denied", "write rejected"));
    }

    #[test]
    fn test_repeats_suppressed_within_window() {
        let (clock, logger) = logger(60);

        assert!(logger.warn("storage.denied", "write rejected"));
        assert!(!logger.warn("storage.denied", "write rejected"));
        assert!(!logger.warn("storage.denied", "write rejected"));
        assert_eq!(logger.pending_suppressed("storage.denied"), 2);

        clock.advance(Duration::from_secs(61));
        assert!(logger.warn("storage.denied", "write rejected"));
        assert_eq!(logger.pending_suppressed("storage.denied"), 0);
        assert_eq!(logger.suppressed_total(), 2);
    }

    #[test]
    fn test_keys_are_independent() {
        let (_clock, logger) = logger(60);

        assert!(logger.info("sync.rejected", "breaker open"));
        assert!(logger.info("emergency.suppressed", "lock held"));
        assert!(!logger.info("sync.rejected", "breaker open"));
    }

    #[test]
    fn test_errors_bypass_throttle() {
        let (_clock, logger) = logger(60);

        assert!(logger.error("recovery.failed", "purge failed"));
        assert!(logger.error("recovery.failed", "purge failed"));
        assert!(logger.error("recovery.failed", "purge failed"));
        assert_eq!(logger.suppressed_total(), 0);
    }
}
