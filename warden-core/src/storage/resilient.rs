//! Degraded memory-only mode
//!
//! [`ResilientStore`] mirrors every write into a [`MemoryStore`]. The first
//! time the primary store fails it switches to serving from the mirror,
//! reports a fault signal, and stops touching the primary until
//! [`ResilientStore::try_restore`] succeeds.

use super::{FaultSink, KeyValueStore, MemoryStore, StorageResult};
use crate::core::StorageError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{info, warn};

pub struct ResilientStore {
    primary: Arc<dyn KeyValueStore>,
    mirror: MemoryStore,
    degraded: AtomicBool,
    primary_failures: AtomicU64,
    sink: RwLock<Option<Weak<dyn FaultSink>>>,
}

impl ResilientStore {
    /// Wrap `primary`, seeding the mirror with whatever it currently holds
    pub fn new(primary: Arc<dyn KeyValueStore>) -> Self {
        let store = Self {
            primary,
            mirror: MemoryStore::new(),
            degraded: AtomicBool::new(false),
            primary_failures: AtomicU64::new(0),
            sink: RwLock::new(None),
        };
        if let Err(e) = store.seed_mirror() {
            store.enter_degraded("open", &e);
        }
        store
    }

    /// Report primary failures to `sink`
    ///
    /// Held weakly: the sink usually owns this store through recovery.
    pub fn attach_fault_sink(&self, sink: Weak<dyn FaultSink>) {
        *self.sink.write() = Some(sink);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn primary_failures(&self) -> u64 {
        self.primary_failures.load(Ordering::Relaxed)
    }

    /// Leave degraded mode if the primary answers again
    ///
    /// The mirror's contents are written back to the primary first.
    pub fn try_restore(&self) -> StorageResult<()> {
        if !self.is_degraded() {
            return Ok(());
        }
        for key in self.mirror.keys()? {
            if let Some(value) = self.mirror.get(&key)? {
                self.primary.set(&key, &value)?;
            }
        }
        self.degraded.store(false, Ordering::Release);
        info!(store = self.primary.name(), "Primary store restored, leaving memory-only mode");
        Ok(())
    }

    fn seed_mirror(&self) -> StorageResult<()> {
        for key in self.primary.keys()? {
            if let Some(value) = self.primary.get(&key)? {
                self.mirror.set(&key, &value)?;
            }
        }
        Ok(())
    }

    fn enter_degraded(&self, operation: &str, error: &StorageError) {
        self.primary_failures.fetch_add(1, Ordering::Relaxed);
        if !self.degraded.swap(true, Ordering::AcqRel) {
            warn!(
                store = self.primary.name(),
                operation,
                error = %error,
                "Primary store failed, switching to memory-only mode"
            );
        }

        let sink = self.sink.read().as_ref().and_then(Weak::upgrade);
        if let Some(sink) = sink {
            sink.report_fault("storage");
        }
    }

    fn on_primary<T>(
        &self,
        operation: &str,
        call: impl FnOnce(&dyn KeyValueStore) -> StorageResult<T>,
    ) -> Option<T> {
        if self.is_degraded() {
            return None;
        }
        match call(self.primary.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                self.enter_degraded(operation, &e);
                None
            }
        }
    }
}

impl KeyValueStore for ResilientStore {
    fn name(&self) -> &str {
        "resilient"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match self.on_primary("get", |p| p.get(key)) {
            Some(value) => Ok(value),
            None => self.mirror.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.mirror.set(key, value)?;
        self.on_primary("set", |p| p.set(key, value));
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.mirror.remove(key)?;
        self.on_primary("remove", |p| p.remove(key));
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        match self.on_primary("keys", |p| p.keys()) {
            Some(keys) => Ok(keys),
            None => self.mirror.keys(),
        }
    }

    fn clear_all(&self) -> StorageResult<()> {
        self.mirror.clear_all()?;
        self.on_primary("clear_all", |p| p.clear_all());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FailingStore;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSink {
        faults: AtomicUsize,
    }

    impl FaultSink for CountingSink {
        fn report_fault(&self, _source: &str) {
            self.faults.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_healthy_primary_is_used() {
        let primary = Arc::new(MemoryStore::new());
        primary.set("existing", "1").unwrap();

        let store = ResilientStore::new(primary.clone());
        store.set("new", "2").unwrap();

        assert!(!store.is_degraded());
        assert_eq!(primary.get("new").unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("existing").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_primary_failure_degrades_and_reports() {
        let primary = Arc::new(FailingStore::new());
        let store = ResilientStore::new(primary.clone());
        let sink = Arc::new(CountingSink::default());
        let sink_dyn: Arc<dyn FaultSink> = sink.clone();
        store.attach_fault_sink(Arc::downgrade(&sink_dyn));

        store.set("before", "1").unwrap();
        primary.set_failing(true);

        store.set("during", "2").unwrap();
        assert!(store.is_degraded());
        assert_eq!(sink.faults.load(Ordering::SeqCst), 1);

        // Served from memory, primary untouched while degraded
        assert_eq!(store.get("before").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("during").unwrap().as_deref(), Some("2"));
        assert_eq!(sink.faults.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_restore_writes_back_mirror() {
        let primary = Arc::new(FailingStore::new());
        let store = ResilientStore::new(primary.clone());

        primary.set_failing(true);
        store.set("offline_write", "x").unwrap();
        assert!(store.is_degraded());

        assert!(store.try_restore().is_err());

        primary.set_failing(false);
        store.try_restore().unwrap();
        assert!(!store.is_degraded());
        assert_eq!(primary.get("offline_write").unwrap().as_deref(), Some("x"));
    }
}
