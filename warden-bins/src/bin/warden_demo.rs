//! Warden demo - a supervised client under injected faults
//!
//! Runs a supervisor with:
//! - Three sync modules, one of which fails in bursts
//! - A shared connection pool managed as a single-flight resource
//! - Optional file-backed state that survives recovery for preserved keys
//! - A fault injector that raises global error signals
//!
//! Watch the logs to see the sync breaker trip, safe mode engage, emergency
//! recovery purge state and rewarm the pool, and the system settle again.
//! Stops on Ctrl+C or after `--duration-secs`.

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use futures::future::{BoxFuture, FutureExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use warden_bins::common::{init_logging, print_health, print_stats, CommonArgs};
use warden_core::core::{SupervisorError, SupervisorResult};
use warden_core::resilience::{install_panic_handler, ResourceFactory, SingletonResourceManager};
use warden_core::storage::{FileStore, KeyValueStore, MemoryStore};
use warden_core::sync::ModuleSync;
use warden_core::SupervisorBuilder;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a supervised demo client with injected faults")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Stop after this many seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "120")]
    duration_secs: u64,

    /// JSON file for persisted state (memory only when unset)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// The flaky module fails this many calls in a row...
    #[arg(long, default_value = "4")]
    burst: u64,

    /// ...out of every this many calls
    #[arg(long, default_value = "10")]
    cycle: u64,

    /// Global error signals raised per second
    #[arg(long, default_value = "0")]
    faults_per_sec: u32,

    /// Log health every this many seconds
    #[arg(long, default_value = "15")]
    report_every_secs: u64,
}

/// Module that fails `burst` calls out of every `cycle`
struct FlakyModule {
    name: String,
    burst: u64,
    cycle: u64,
    calls: AtomicU64,
    latency: Duration,
}

#[async_trait]
impl ModuleSync for FlakyModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sync(&self) -> SupervisorResult<()> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;

        if self.cycle > 0 && call % self.cycle < self.burst {
            return Err(SupervisorError::module(
                self.name.clone(),
                format!("upstream unavailable (call {})", call),
            ));
        }
        debug!(module = %self.name, call, "Module synced");
        Ok(())
    }
}

struct ConnectionPool {
    generation: u64,
    endpoint: String,
}

/// Builds a pool after a short handshake
#[derive(Default)]
struct PoolFactory {
    built: AtomicU64,
}

impl ResourceFactory for PoolFactory {
    type Resource = ConnectionPool;
    type Config = String;

    fn build(&self, endpoint: &String) -> BoxFuture<'static, SupervisorResult<Arc<ConnectionPool>>> {
        let generation = self.built.fetch_add(1, Ordering::Relaxed) + 1;
        let endpoint = endpoint.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            info!(%endpoint, generation, "Connection pool ready");
            Ok(Arc::new(ConnectionPool {
                generation,
                endpoint,
            }))
        }
        .boxed()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.common.load_config()?;

    init_logging(&config)?;
    install_panic_handler();

    info!("=== Warden: Supervised Demo ===");
    info!(
        "Flaky module fails {} of every {} calls, {} fault signals/s",
        args.burst, args.cycle, args.faults_per_sec
    );

    let store: Arc<dyn KeyValueStore> = match &args.state_file {
        Some(path) => {
            info!("Persisting state to {}", path.display());
            Arc::new(FileStore::open(path)?)
        }
        None => Arc::new(MemoryStore::new()),
    };

    let pool = Arc::new(SingletonResourceManager::new(PoolFactory::default()));
    let endpoint = "wss://realtime.example.invalid".to_string();

    let module = |name: &str, burst: u64, cycle: u64, latency_ms: u64| {
        Arc::new(FlakyModule {
            name: name.to_string(),
            burst,
            cycle,
            calls: AtomicU64::new(0),
            latency: Duration::from_millis(latency_ms),
        })
    };

    let supervisor = SupervisorBuilder::new(config)
        .store(store)
        .module(module("profile", 0, 0, 50))
        .module(module("leaderboard", 0, 0, 120))
        .module(module("social", args.burst, args.cycle, 80))
        .managed_resource("connection-pool", Arc::clone(&pool), endpoint.clone())
        .build()?;

    {
        let store = supervisor.store().cloned();
        supervisor.add_unload_hook(Box::new(move || {
            let store = store.clone();
            async move {
                if let Some(store) = store {
                    if let Err(e) = store.set("session_id", "demo") {
                        warn!(error = %e, "Failed to persist session on unload");
                    }
                }
            }
            .boxed()
        }));
    }

    if let Some(store) = supervisor.store() {
        store.set("auth_token", "demo-token")?;
        store.set("question_cache", "[]")?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrlc = Arc::clone(&running);
    ctrlc::set_handler(move || {
        warn!("Received Ctrl+C, initiating graceful shutdown...");
        running_ctrlc.store(false, Ordering::SeqCst);
    })?;

    supervisor.start();
    match pool.get_instance(endpoint.clone()).await {
        Ok(conn) => info!(generation = conn.generation, endpoint = %conn.endpoint, "Pool in use"),
        Err(e) => error!(error = %e, "Initial pool construction failed"),
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut elapsed_secs = 0u64;
    while running.load(Ordering::SeqCst) {
        ticker.tick().await;
        elapsed_secs += 1;

        for _ in 0..args.faults_per_sec {
            supervisor.on_global_error("fault-injector");
        }

        if args.report_every_secs > 0 && elapsed_secs % args.report_every_secs == 0 {
            print_health(&supervisor.health());
        }

        if args.duration_secs > 0 && elapsed_secs >= args.duration_secs {
            info!("Demo duration reached");
            break;
        }
    }

    supervisor.shutdown().await;
    print_stats(&supervisor, args.common.metrics)?;

    info!("Shutdown complete");
    Ok(())
}
