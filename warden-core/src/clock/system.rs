//! Wall-clock implementation backed by tokio timers

use super::{Callback, Clock, RepeatingCallback, ScheduledHandle};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Production clock
///
/// Callbacks run on the tokio runtime that is current when they are
/// scheduled. Outside a runtime each callback gets its own thread, which is
/// reported once per clock and counted in [`SystemClock::fallback_threads`].
pub struct SystemClock {
    next_id: AtomicU64,
    fallback_threads: AtomicU64,
    warned_no_runtime: AtomicBool,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            fallback_threads: AtomicU64::new(0),
            warned_no_runtime: AtomicBool::new(false),
        }
    }

    /// Callbacks scheduled on a dedicated thread because no runtime was current
    pub fn fallback_threads(&self) -> u64 {
        self.fallback_threads.load(Ordering::Relaxed)
    }

    fn next_handle(&self) -> ScheduledHandle {
        ScheduledHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn warn_no_runtime(&self) {
        let threads = self.fallback_threads.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.warned_no_runtime.swap(true, Ordering::Relaxed) {
            warn!("No tokio runtime available, scheduling callbacks on threads");
        } else {
            debug!(threads, "Scheduling callback on a fallback thread");
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule_after(&self, delay: Duration, callback: Callback) -> ScheduledHandle {
        let handle = self.next_handle();
        let cancelled = handle.flag();
        let finished = handle.finished_flag();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let task = runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if !cancelled.load(Ordering::Acquire) {
                        callback();
                    }
                    finished.store(true, Ordering::Release);
                });
                handle.with_abort(task.abort_handle())
            }
            Err(_) => {
                self.warn_no_runtime();
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    if !cancelled.load(Ordering::Acquire) {
                        callback();
                    }
                    finished.store(true, Ordering::Release);
                });
                handle
            }
        }
    }

    fn schedule_every(&self, period: Duration, callback: RepeatingCallback) -> ScheduledHandle {
        let handle = self.next_handle();
        let cancelled = handle.flag();
        let period = period.max(Duration::from_millis(1));

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let task = runtime.spawn(async move {
                    let start = tokio::time::Instant::now() + period;
                    let mut ticker = tokio::time::interval_at(start, period);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        if cancelled.load(Ordering::Acquire) {
                            break;
                        }
                        callback();
                    }
                });
                handle.with_abort(task.abort_handle())
            }
            Err(_) => {
                self.warn_no_runtime();
                std::thread::spawn(move || loop {
                    std::thread::sleep(period);
                    if cancelled.load(Ordering::Acquire) {
                        break;
                    }
                    callback();
                });
                handle
            }
        }
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}
