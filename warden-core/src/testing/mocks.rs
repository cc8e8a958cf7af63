//! Programmable collaborators for tests and demos
//!
//! - [`ScriptedModule`]: sync module that follows a scripted list of outcomes
//! - [`HangingModule`]: sync module that never finishes
//! - [`PanickingModule`]: sync module that panics on every call
//! - [`FailingStore`]: key-value store with a failure switch
//! - [`CountingFactory`]: resource factory that counts constructions

use crate::core::{StorageError, SupervisorError, SupervisorResult};
use crate::resilience::ResourceFactory;
use crate::storage::{KeyValueStore, MemoryStore, StorageResult};
use crate::sync::ModuleSync;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Sync module that replays scripted outcomes, then a fallback
pub struct ScriptedModule {
    name: String,
    script: Mutex<VecDeque<bool>>,
    fallback_ok: AtomicBool,
    calls: AtomicU64,
}

impl ScriptedModule {
    /// `outcomes` are consumed one per call (`true` = success), then
    /// `then_ok` applies forever
    pub fn new(name: impl Into<String>, outcomes: impl IntoIterator<Item = bool>, then_ok: bool) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(outcomes.into_iter().collect()),
            fallback_ok: AtomicBool::new(then_ok),
            calls: AtomicU64::new(0),
        }
    }

    pub fn always_ok(name: impl Into<String>) -> Self {
        Self::new(name, [], true)
    }

    pub fn always_failing(name: impl Into<String>) -> Self {
        Self::new(name, [], false)
    }

    /// Switch the fallback outcome
    pub fn set_healthy(&self, healthy: bool) {
        self.fallback_ok.store(healthy, Ordering::Release);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ModuleSync for ScriptedModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sync(&self) -> SupervisorResult<()> {
        let call = self.calls.fetch_add(1, Ordering::AcqRel) + 1;
        let ok = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback_ok.load(Ordering::Acquire));

        if ok {
            Ok(())
        } else {
            Err(SupervisorError::module(
                self.name.clone(),
                format!("scripted failure on call {}", call),
            ))
        }
    }
}

/// Sync module whose `sync` never completes
///
/// Counts how many of its pending futures were dropped, which is how a
/// timed-out pass cancels module work.
pub struct HangingModule {
    name: String,
    started: AtomicUsize,
    cancelled: Arc<AtomicUsize>,
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

impl HangingModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: AtomicUsize::new(0),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::Acquire)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ModuleSync for HangingModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sync(&self) -> SupervisorResult<()> {
        self.started.fetch_add(1, Ordering::AcqRel);
        let _guard = DropCounter(Arc::clone(&self.cancelled));
        futures::future::pending::<()>().await;
        Ok(())
    }
}

/// Sync module whose `sync` panics
pub struct PanickingModule {
    name: String,
    calls: AtomicU64,
}

impl PanickingModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ModuleSync for PanickingModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sync(&self) -> SupervisorResult<()> {
        let call = self.calls.fetch_add(1, Ordering::AcqRel) + 1;
        panic!("{} exploded on call {}", self.name, call);
    }
}

/// Memory store with a switch that makes every operation fail
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    failing: AtomicBool,
    failures: AtomicU64,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::Acquire) {
            self.failures.fetch_add(1, Ordering::AcqRel);
            Err(StorageError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.check()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check()?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.check()?;
        self.inner.remove(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.check()?;
        self.inner.keys()
    }

    fn clear_all(&self) -> StorageResult<()> {
        self.check()?;
        self.inner.clear_all()
    }
}

/// Resource handed out by [`CountingFactory`]
#[derive(Debug)]
pub struct TestResource {
    pub id: u64,
    pub config: String,
}

/// Factory that numbers its constructions and can be told to fail
#[derive(Clone, Default)]
pub struct CountingFactory {
    builds: Arc<AtomicU64>,
    failing: Arc<AtomicBool>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Acquire)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }
}

impl ResourceFactory for CountingFactory {
    type Resource = TestResource;
    type Config = String;

    fn build(&self, config: &String) -> BoxFuture<'static, SupervisorResult<Arc<TestResource>>> {
        let id = self.builds.fetch_add(1, Ordering::AcqRel) + 1;
        let fail = self.failing.load(Ordering::Acquire);
        let config = config.clone();
        async move {
            // Give concurrent callers a chance to join
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            if fail {
                Err(SupervisorError::ConstructionFailed(format!(
                    "build {} of {} refused",
                    id, config
                )))
            } else {
                Ok(Arc::new(TestResource { id, config }))
            }
        }
        .boxed()
    }
}
