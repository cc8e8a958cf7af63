//! Bookkeeping for scheduled callbacks
//!
//! The supervisor registers its own periodic work as [`TaskScope::Core`].
//! Anything else (module refresh timers, delayed warm-ups) is registered as
//! [`TaskScope::Transient`] and may be released by recovery.
//!
//! Entries whose callback was cancelled or has already run are pruned on the
//! next registration and never count as released.

use super::ScheduledHandle;
use parking_lot::Mutex;
use tracing::debug;

/// Ownership class of a registered callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    /// Owned by the supervisor itself, survives recovery
    Core,
    /// Released by recovery ("orphaned" once its owner is reset)
    Transient,
}

struct Entry {
    scope: TaskScope,
    label: String,
    handle: ScheduledHandle,
}

/// Registry of live scheduled callbacks
#[derive(Default)]
pub struct TaskRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `handle` under `scope`
    pub fn register(&self, scope: TaskScope, label: impl Into<String>, handle: ScheduledHandle) {
        let mut entries = self.entries.lock();
        entries.retain(|e| e.handle.is_pending());
        entries.push(Entry {
            scope,
            label: label.into(),
            handle,
        });
    }

    /// Cancel and forget every transient callback, returning how many were released
    pub fn release_transient(&self) -> usize {
        let mut entries = self.entries.lock();
        let mut released = 0;
        entries.retain(|e| {
            if !e.handle.is_pending() {
                return false;
            }
            if e.scope == TaskScope::Transient {
                debug!(label = %e.label, "Releasing transient scheduled callback");
                e.handle.cancel();
                released += 1;
                return false;
            }
            true
        });
        released
    }

    /// Cancel everything (shutdown)
    pub fn cancel_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.iter().filter(|e| e.handle.is_pending()).count();
        for entry in entries.drain(..) {
            entry.handle.cancel();
        }
        count
    }

    /// Callbacks in `scope` that can still fire
    pub fn count(&self, scope: TaskScope) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.scope == scope && e.handle.is_pending())
            .count()
    }
}
