//! Time source and callback scheduling
//!
//! Every component reads time and schedules delayed work through [`Clock`],
//! never through `Instant::now()` or `tokio::time` directly. Production uses
//! [`SystemClock`]; tests drive a [`ManualClock`] forward explicitly.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use warden_core::clock::{Clock, ManualClock};
//!
//! let clock = Arc::new(ManualClock::new());
//! let handle = clock.schedule_after(Duration::from_secs(10), Box::new(|| {
//!     println!("fired");
//! }));
//! clock.advance(Duration::from_secs(10)); // prints "fired"
//! assert!(!handle.is_cancelled());
//! ```

pub mod manual;
pub mod registry;
pub mod system;

pub use manual::ManualClock;
pub use registry::{TaskRegistry, TaskScope};
pub use system::SystemClock;

use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One-shot scheduled callback
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Periodic scheduled callback
pub type RepeatingCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Injectable source of monotonic time and delayed execution
pub trait Clock: Send + Sync {
    /// Current monotonic time
    fn now(&self) -> Instant;

    /// Run `callback` once after `delay`
    fn schedule_after(&self, delay: Duration, callback: Callback) -> ScheduledHandle;

    /// Run `callback` every `period`, first firing one period from now
    fn schedule_every(&self, period: Duration, callback: RepeatingCallback) -> ScheduledHandle;

    /// Future that completes once `duration` has elapsed on this clock
    ///
    /// Dropping the future cancels the underlying timer.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = self.schedule_after(
            duration,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );

        Box::pin(async move {
            let _guard = CancelOnDrop(handle);
            let _ = rx.await;
        })
    }

    /// Time elapsed since `earlier`, saturating at zero
    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

/// Handle to a scheduled callback
///
/// Cloning shares the cancellation and completion flags. Dropping the handle
/// does NOT cancel the callback.
#[derive(Clone)]
pub struct ScheduledHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    abort: Option<tokio::task::AbortHandle>,
}

impl ScheduledHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            abort: None,
        }
    }

    pub(crate) fn with_abort(mut self, abort: tokio::task::AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    pub(crate) fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub(crate) fn finished_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.finished)
    }

    /// Identifier unique within the issuing clock
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Prevent the callback from firing (again)
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether a one-shot callback has already run
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Still able to fire: neither cancelled nor finished
    pub fn is_pending(&self) -> bool {
        !self.is_cancelled() && !self.is_finished()
    }
}

impl fmt::Debug for ScheduledHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Cancels the wrapped handle when dropped
pub struct CancelOnDrop(pub ScheduledHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
