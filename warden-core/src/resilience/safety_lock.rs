//! Self-expiring safety lock
//!
//! Guards emergency activation against reentry. The lock is an atomic flag
//! plus a monotonic expiry read from the injected [`Clock`]: it counts as held
//! only while the flag is set AND the expiry is in the future, so a lost
//! release callback cannot wedge it. Callers that find it held decline, they
//! never queue.

use crate::clock::Clock;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Proof of one acquisition, used to release exactly that acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken(u64);

pub struct SafetyLock {
    clock: Arc<dyn Clock>,
    held: AtomicBool,
    held_until: Mutex<Option<Instant>>,
    generation: AtomicU64,
}

impl SafetyLock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            held: AtomicBool::new(false),
            held_until: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Take the lock for `hold`, or return `None` if someone holds it
    pub fn try_acquire(&self, hold: Duration) -> Option<LockToken> {
        let now = self.clock.now();
        let mut until = self.held_until.lock();

        if self.held.load(Ordering::Acquire) && until.map_or(false, |t| now < t) {
            return None;
        }

        *until = Some(now + hold);
        self.held.store(true, Ordering::Release);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(generation, hold_ms = hold.as_millis() as u64, "Safety lock acquired");
        Some(LockToken(generation))
    }

    /// Release the acquisition identified by `token`
    ///
    /// A token from an older acquisition is ignored.
    pub fn release(&self, token: LockToken) -> bool {
        let mut until = self.held_until.lock();
        if self.generation.load(Ordering::Acquire) != token.0 {
            return false;
        }
        *until = None;
        self.held.store(false, Ordering::Release);
        debug!(generation = token.0, "Safety lock released");
        true
    }

    /// Release regardless of who holds it
    pub fn force_release(&self) {
        let mut until = self.held_until.lock();
        *until = None;
        self.held.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        if !self.held.load(Ordering::Acquire) {
            return false;
        }
        let now = self.clock.now();
        self.held_until.lock().map_or(false, |t| now < t)
    }

    /// Expiry of the current hold, if held
    pub fn held_until(&self) -> Option<Instant> {
        if self.is_held() {
            *self.held_until.lock()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn lock() -> (Arc<ManualClock>, SafetyLock) {
        let clock = Arc::new(ManualClock::new());
        let lock = SafetyLock::new(clock.clone());
        (clock, lock)
    }

    #[test]
    fn test_second_acquire_declines() {
        let (_clock, lock) = lock();
        assert!(lock.try_acquire(Duration::from_secs(10)).is_some());
        assert!(lock.try_acquire(Duration::from_secs(10)).is_none());
        assert!(lock.is_held());
    }

    #[test]
    fn test_lock_expires_without_release() {
        let (clock, lock) = lock();
        lock.try_acquire(Duration::from_secs(10)).unwrap();

        clock.advance(Duration::from_secs(9));
        assert!(lock.is_held());

        clock.advance(Duration::from_secs(1));
        assert!(!lock.is_held());
        assert!(lock.try_acquire(Duration::from_secs(10)).is_some());
    }

    #[test]
    fn test_stale_token_does_not_release_newer_hold() {
        let (clock, lock) = lock();
        let first = lock.try_acquire(Duration::from_secs(1)).unwrap();
        clock.advance(Duration::from_secs(2));
        let second = lock.try_acquire(Duration::from_secs(10)).unwrap();

        assert!(!lock.release(first));
        assert!(lock.is_held());
        assert!(lock.release(second));
        assert!(!lock.is_held());
    }

    #[test]
    fn test_force_release() {
        let (_clock, lock) = lock();
        lock.try_acquire(Duration::from_secs(10)).unwrap();
        lock.force_release();
        assert!(!lock.is_held());
        assert_eq!(lock.held_until(), None);
    }
}
