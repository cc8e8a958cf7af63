//! Single-flight lifecycle manager for shared resources
//!
//! Keeps at most one live instance per configuration key. The first caller of
//! [`SingletonResourceManager::get_instance`] starts construction; everyone
//! arriving while it runs awaits the same `Shared` future. Success installs
//! the instance, failure clears the slot so the next caller retries.
//!
//! [`SingletonResourceManager::destroy_all_instances`] drops every instance
//! and orphans in-flight constructions. Each destroy bumps a generation, and
//! a construction that resolves under an older generation is discarded
//! instead of installed. Nothing is rebuilt eagerly.

use crate::core::{SupervisorError, SupervisorResult};
use crate::monitoring::SupervisorMetrics;
use crate::resilience::recovery::ResetTarget;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds instances of a shared resource
///
/// `build` is called under the manager's lock and must only create the
/// future; the actual work happens when it is polled.
pub trait ResourceFactory: Send + Sync + 'static {
    type Resource: Send + Sync + 'static;
    type Config: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static;

    fn build(
        &self,
        config: &Self::Config,
    ) -> BoxFuture<'static, SupervisorResult<Arc<Self::Resource>>>;
}

type SharedBuild<R> = Shared<BoxFuture<'static, SupervisorResult<Arc<R>>>>;

enum Slot<R> {
    Ready(Arc<R>),
    Constructing {
        generation: u64,
        future: SharedBuild<R>,
    },
}

/// Counters exposed through [`SingletonResourceManager::system_status`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingletonStatus {
    pub live_instances: usize,
    pub constructing: usize,
    /// Strong references held outside the manager
    pub outstanding_refs: usize,
    pub constructions_started: u64,
    pub constructions_failed: u64,
    pub constructions_abandoned: u64,
    pub destroy_count: u64,
    pub handouts: u64,
}

pub struct SingletonResourceManager<F: ResourceFactory> {
    factory: F,
    slots: Mutex<HashMap<F::Config, Slot<F::Resource>>>,
    generation: AtomicU64,
    constructions_started: AtomicU64,
    constructions_failed: AtomicU64,
    constructions_abandoned: AtomicU64,
    destroy_count: AtomicU64,
    handouts: AtomicU64,
    metrics: Option<SupervisorMetrics>,
}

impl<F: ResourceFactory> SingletonResourceManager<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            constructions_started: AtomicU64::new(0),
            constructions_failed: AtomicU64::new(0),
            constructions_abandoned: AtomicU64::new(0),
            destroy_count: AtomicU64::new(0),
            handouts: AtomicU64::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SupervisorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Get the instance for `config`, constructing it if needed
    ///
    /// Concurrent callers for the same key share one construction. Returns
    /// [`SupervisorError::ConstructionAbandoned`] if a destroy happened while
    /// the construction was in flight.
    pub async fn get_instance(&self, config: F::Config) -> SupervisorResult<Arc<F::Resource>> {
        let (future, generation) = {
            let mut slots = self.slots.lock();
            match slots.get(&config) {
                Some(Slot::Ready(instance)) => {
                    self.handouts.fetch_add(1, Ordering::Relaxed);
                    return Ok(Arc::clone(instance));
                }
                Some(Slot::Constructing { generation, future }) => {
                    debug!(?config, "Joining in-flight construction");
                    (future.clone(), *generation)
                }
                None => {
                    let generation = self.generation.load(Ordering::Acquire);
                    let future = self.factory.build(&config).shared();
                    slots.insert(
                        config.clone(),
                        Slot::Constructing {
                            generation,
                            future: future.clone(),
                        },
                    );
                    self.constructions_started.fetch_add(1, Ordering::Relaxed);
                    debug!(?config, generation, "Starting construction");
                    (future, generation)
                }
            }
        };

        let result = future.await;

        let mut slots = self.slots.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            if let Some(Slot::Constructing { generation: g, .. }) = slots.get(&config) {
                if *g == generation {
                    slots.remove(&config);
                }
            }
            debug!(?config, generation, "Construction finished after destroy, discarding");
            return Err(SupervisorError::ConstructionAbandoned);
        }

        match result {
            Ok(instance) => {
                match slots.get(&config) {
                    Some(Slot::Constructing { generation: g, .. }) if *g == generation => {
                        slots.insert(config.clone(), Slot::Ready(Arc::clone(&instance)));
                        info!(?config, "Shared resource constructed");
                        self.record_construction("succeeded");
                        self.update_live_gauge(&slots);
                    }
                    Some(Slot::Ready(existing)) => {
                        self.handouts.fetch_add(1, Ordering::Relaxed);
                        return Ok(Arc::clone(existing));
                    }
                    _ => {}
                }
                self.handouts.fetch_add(1, Ordering::Relaxed);
                Ok(instance)
            }
            Err(e) => {
                if let Some(Slot::Constructing { generation: g, .. }) = slots.get(&config) {
                    if *g == generation {
                        slots.remove(&config);
                        self.constructions_failed.fetch_add(1, Ordering::Relaxed);
                        self.record_construction("failed");
                        warn!(?config, error = %e, "Shared resource construction failed");
                    }
                }
                Err(e)
            }
        }
    }

    /// Drop every instance and orphan in-flight constructions
    ///
    /// Returns how many live instances were dropped. A no-op when nothing
    /// exists.
    pub fn destroy_all_instances(&self) -> usize {
        let mut slots = self.slots.lock();
        if slots.is_empty() {
            return 0;
        }

        self.generation.fetch_add(1, Ordering::AcqRel);

        let mut live = 0;
        let mut orphaned = 0;
        for (_, slot) in slots.drain() {
            match slot {
                Slot::Ready(_) => live += 1,
                Slot::Constructing { .. } => orphaned += 1,
            }
        }

        self.destroy_count.fetch_add(1, Ordering::Relaxed);
        self.constructions_abandoned
            .fetch_add(orphaned as u64, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.resource().destroys_total.inc();
            metrics
                .resource()
                .constructions_total
                .with_label_values(&["abandoned"])
                .inc_by(orphaned as u64);
            metrics.resource().live_instances.set(0);
        }

        info!(live, orphaned, "Destroyed shared resource instances");
        live
    }

    /// Whether `instance` is still the installed instance
    ///
    /// Holders re-validate with this after an await.
    pub fn is_current(&self, instance: &Arc<F::Resource>) -> bool {
        self.slots.lock().values().any(|slot| match slot {
            Slot::Ready(current) => Arc::ptr_eq(current, instance),
            Slot::Constructing { .. } => false,
        })
    }

    pub fn system_status(&self) -> SingletonStatus {
        let slots = self.slots.lock();
        let mut status = SingletonStatus {
            constructions_started: self.constructions_started.load(Ordering::Relaxed),
            constructions_failed: self.constructions_failed.load(Ordering::Relaxed),
            constructions_abandoned: self.constructions_abandoned.load(Ordering::Relaxed),
            destroy_count: self.destroy_count.load(Ordering::Relaxed),
            handouts: self.handouts.load(Ordering::Relaxed),
            ..Default::default()
        };
        for slot in slots.values() {
            match slot {
                Slot::Ready(instance) => {
                    status.live_instances += 1;
                    status.outstanding_refs += Arc::strong_count(instance) - 1;
                }
                Slot::Constructing { .. } => status.constructing += 1,
            }
        }
        status
    }

    pub fn live_instances(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    fn record_construction(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .resource()
                .constructions_total
                .with_label_values(&[outcome])
                .inc();
        }
    }

    fn update_live_gauge(&self, slots: &HashMap<F::Config, Slot<F::Resource>>) {
        if let Some(metrics) = &self.metrics {
            let live = slots
                .values()
                .filter(|slot| matches!(slot, Slot::Ready(_)))
                .count();
            metrics.resource().live_instances.set(live as i64);
        }
    }
}

/// Adapter that lets recovery reset and rewarm one managed resource
///
/// Rewarming spawns `get_instance(config)` on the current tokio runtime; with
/// no runtime the instance is simply rebuilt by the next caller.
pub struct ManagedResource<F: ResourceFactory> {
    name: String,
    manager: Arc<SingletonResourceManager<F>>,
    config: F::Config,
}

impl<F: ResourceFactory> ManagedResource<F> {
    pub fn new(
        name: impl Into<String>,
        manager: Arc<SingletonResourceManager<F>>,
        config: F::Config,
    ) -> Self {
        Self {
            name: name.into(),
            manager,
            config,
        }
    }

    pub fn manager(&self) -> &Arc<SingletonResourceManager<F>> {
        &self.manager
    }
}

impl<F: ResourceFactory> ResetTarget for ManagedResource<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&self) -> SupervisorResult<usize> {
        Ok(self.manager.destroy_all_instances())
    }

    fn rewarm(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(resource = %self.name, "No runtime for rewarm, deferring to next caller");
            return;
        };
        let manager = Arc::clone(&self.manager);
        let config = self.config.clone();
        let name = self.name.clone();
        runtime.spawn(async move {
            match manager.get_instance(config).await {
                Ok(_) => debug!(resource = %name, "Shared resource rewarmed"),
                Err(e) => warn!(resource = %name, error = %e, "Rewarm failed"),
            }
        });
    }

    fn live_instances(&self) -> usize {
        self.manager.live_instances()
    }
}
