//! Manually advanced clock for deterministic tests
//!
//! Time only moves when [`ManualClock::advance`] is called. Due callbacks run
//! synchronously on the advancing thread, in deadline order, with `now()`
//! reporting each callback's own deadline while it runs.

use super::{Callback, Clock, RepeatingCallback, ScheduledHandle};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

enum TimerKind {
    Once(Callback),
    Every {
        period: Duration,
        callback: RepeatingCallback,
    },
}

struct Timer {
    kind: TimerKind,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

struct Inner {
    origin: Instant,
    elapsed: Duration,
    next_id: u64,
    /// Keyed by (deadline offset, id) so equal deadlines fire in schedule order
    timers: BTreeMap<(Duration, u64), Timer>,
}

/// Virtual clock driven by tests
pub struct ManualClock {
    inner: Mutex<Inner>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                origin: Instant::now(),
                elapsed: Duration::ZERO,
                next_id: 0,
                timers: BTreeMap::new(),
            }),
        }
    }

    /// Total virtual time advanced so far
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed
    }

    /// Number of timers still waiting to fire (cancelled ones included until reached)
    pub fn pending_timers(&self) -> usize {
        self.inner
            .lock()
            .timers
            .values()
            .filter(|t| !t.cancelled.load(Ordering::Acquire))
            .count()
    }

    /// Move time forward by `by`, firing every callback that falls due
    pub fn advance(&self, by: Duration) {
        let target = self.inner.lock().elapsed + by;

        loop {
            let due = {
                let mut inner = self.inner.lock();
                let key = match inner.timers.keys().next() {
                    Some(&key) if key.0 <= target => key,
                    _ => break,
                };
                let timer = inner.timers.remove(&key);
                inner.elapsed = inner.elapsed.max(key.0);
                timer.map(|t| (key, t))
            };

            // Run outside the lock so callbacks may schedule more work
            if let Some(((deadline, id), timer)) = due {
                if timer.cancelled.load(Ordering::Acquire) {
                    continue;
                }
                match timer.kind {
                    TimerKind::Once(callback) => {
                        callback();
                        timer.finished.store(true, Ordering::Release);
                    }
                    TimerKind::Every { period, callback } => {
                        callback();
                        if !timer.cancelled.load(Ordering::Acquire) {
                            self.inner.lock().timers.insert(
                                (deadline + period, id),
                                Timer {
                                    kind: TimerKind::Every { period, callback },
                                    cancelled: timer.cancelled,
                                    finished: timer.finished,
                                },
                            );
                        }
                    }
                }
            }
        }

        let mut inner = self.inner.lock();
        inner.elapsed = inner.elapsed.max(target);
    }

    fn insert(&self, delay: Duration, kind: TimerKind) -> ScheduledHandle {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let handle = ScheduledHandle::new(id);
        let deadline = inner.elapsed + delay;
        inner.timers.insert(
            (deadline, id),
            Timer {
                kind,
                cancelled: handle.flag(),
                finished: handle.finished_flag(),
            },
        );
        handle
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let inner = self.inner.lock();
        inner.origin + inner.elapsed
    }

    fn schedule_after(&self, delay: Duration, callback: Callback) -> ScheduledHandle {
        self.insert(delay, TimerKind::Once(callback))
    }

    fn schedule_every(&self, period: Duration, callback: RepeatingCallback) -> ScheduledHandle {
        // A zero period would spin forever inside advance()
        let period = period.max(Duration::from_millis(1));
        self.insert(period, TimerKind::Every { period, callback })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_now_moves_only_on_advance() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now() - t0, Duration::from_secs(5));
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn test_one_shot_fires_at_deadline() {
        let clock = ManualClock::new();
        let fired = Arc::new(AtomicU64::new(0));
        let f = Arc::clone(&fired);

        let handle = clock.schedule_after(
            Duration::from_secs(10),
            Box::new(move || {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );

        clock.advance(Duration::from_secs(9));
        assert!(handle.is_pending());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_secs(1));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Never fires twice
        clock.advance(Duration::from_secs(60));
        assert!(handle.is_finished());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn test_repeating_fires_each_period() {
        let clock = ManualClock::new();
        let fired = Arc::new(AtomicU64::new(0));
        let f = Arc::clone(&fired);

        let handle = clock.schedule_every(
            Duration::from_secs(2),
            Arc::new(move || {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );

        clock.advance(Duration::from_secs(7));
        assert_eq!(fired.load(Ordering::SeqCst), 3);

        assert!(!handle.is_finished());
        handle.cancel();
        clock.advance(Duration::from_secs(10));
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancelled_timer_does_not_fire() {
        let clock = ManualClock::new();
        let fired = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&fired);

        let handle = clock.schedule_after(
            Duration::from_secs(1),
            Box::new(move || f.store(true, Ordering::SeqCst)),
        );
        handle.cancel();

        clock.advance(Duration::from_secs(2));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_callback_sees_its_own_deadline() {
        let clock = Arc::new(ManualClock::new());
        let t0 = clock.now();
        let seen = Arc::new(Mutex::new(None));

        let c = Arc::clone(&clock);
        let s = Arc::clone(&seen);
        clock.schedule_after(
            Duration::from_secs(3),
            Box::new(move || {
                *s.lock() = Some(c.now());
            }),
        );

        clock.advance(Duration::from_secs(10));
        assert_eq!(seen.lock().map(|t| t - t0), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_callback_can_schedule_more_work() {
        let clock = Arc::new(ManualClock::new());
        let fired = Arc::new(AtomicU64::new(0));

        let c = Arc::clone(&clock);
        let f = Arc::clone(&fired);
        clock.schedule_after(
            Duration::from_secs(1),
            Box::new(move || {
                let f2 = Arc::clone(&f);
                c.schedule_after(
                    Duration::from_secs(1),
                    Box::new(move || {
                        f2.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        clock.advance(Duration::from_secs(2));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sleep_completes_after_advance() {
        let clock = Arc::new(ManualClock::new());
        let sleeper = clock.sleep(Duration::from_secs(30));
        let task = tokio::spawn(sleeper);

        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        clock.advance(Duration::from_secs(30));
        task.await.unwrap();
    }
}
