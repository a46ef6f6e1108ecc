//! Wires signal handling, the Fetcher task, and one periodic Pipeline job
//! per category, coordinating a clean shutdown across all of them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::cache::{HashCache, MetadataCache};
use crate::config::AppConfig;
use crate::fetcher::Fetcher;
use crate::pipeline::Pipeline;
use crate::rate_limiter::RateLimiter;
use crate::shutdown::ShutdownSignal;
use crate::source_client::SourceClient;
use crate::store::SqliteStoreGateway;
use crate::write_budget::WriteBudget;

const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(24 * 3600);
const MAINTENANCE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(7 * 24 * 3600);

/// Starts every subsystem and blocks until a shutdown signal is observed and
/// every in-flight task has run to completion.
pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.cache_dir)?;

    let shutdown = ShutdownSignal::new();
    spawn_signal_listener(shutdown.clone());

    let hash_cache = Arc::new(HashCache::open(
        config.cache_dir.join("hashes.db"),
        config.max_hash_rows,
    )?);
    let meta_cache = Arc::new(MetadataCache::open(
        config.cache_dir.join("metadata.db"),
        config.max_meta_rows,
    )?);
    let write_budget = Arc::new(WriteBudget::open(
        config.cache_dir.join("write_budget.db"),
        config.write_budget_max_adds,
        config.write_budget_period,
    )?);
    let store: Arc<dyn crate::store::StoreGateway> = Arc::new(SqliteStoreGateway::open(
        config.cache_dir.join("store.db"),
    )?);

    rehydrate_metadata_cache(&meta_cache, &store).await;

    let limiter = RateLimiter::new(config.max_rpm as usize);
    let source = SourceClient::new(config.wallhaven_api_key.clone(), limiter);
    let fetcher = Arc::new(Fetcher::new(
        source,
        store.clone(),
        meta_cache.clone(),
        write_budget.clone(),
        config.categories.clone(),
        shutdown.clone(),
    ));

    let mut tasks = Vec::new();

    let fetcher_task = {
        let fetcher = fetcher.clone();
        tokio::spawn(async move { fetcher.run().await })
    };
    tasks.push(fetcher_task);

    let category_locks: HashMap<String, Arc<AsyncMutex<()>>> = config
        .categories
        .iter()
        .map(|c| (c.name.clone(), Arc::new(AsyncMutex::new(()))))
        .collect();

    for category in &config.categories {
        let pipeline = Pipeline::new(
            store.clone(),
            hash_cache.clone(),
            crate::chat_client::ChatClient::new(config.telegram_bot_token.clone()),
            config.cache_dir.clone(),
            shutdown.clone(),
        );
        let lock = category_locks[&category.name].clone();
        let category_name = category.name.clone();
        let group_id = category.group_id;
        let interval = category.interval;
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            run_periodic_pipeline(pipeline, category_name, group_id, interval, lock, shutdown)
                .await;
        }));
    }

    tasks.push(tokio::spawn(run_cache_cleanup(
        hash_cache.clone(),
        meta_cache.clone(),
        shutdown.clone(),
    )));
    tasks.push(tokio::spawn(run_maintenance(
        hash_cache.clone(),
        meta_cache.clone(),
        shutdown.clone(),
    )));

    shutdown.wait_for_trigger().await;
    info!("shutdown requested, waiting for in-flight work to finish");
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "task panicked during shutdown");
        }
    }

    hash_cache.close().await.ok();
    meta_cache.close().await.ok();
    info!("shutdown complete");
    Ok(())
}

fn spawn_signal_listener(shutdown: ShutdownSignal) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown signal received");
        shutdown.trigger();
    });
}

async fn rehydrate_metadata_cache(
    meta_cache: &MetadataCache,
    store: &Arc<dyn crate::store::StoreGateway>,
) {
    match meta_cache.row_count().await {
        Ok(0) => match store.scan_metadata().await {
            Ok(rows) => {
                if let Err(e) = meta_cache.bulk_load(rows).await {
                    error!(error = %e, "metadata cache rehydration failed");
                }
            }
            Err(e) => error!(error = %e, "failed to scan store for rehydration"),
        },
        Ok(_) => {}
        Err(e) => error!(error = %e, "failed to read metadata cache row count"),
    }
}

/// Runs `pipeline` for `category` on a fixed interval. Missed ticks are
/// coalesced rather than replayed, and a per-category lock guarantees at
/// most one invocation runs at a time.
async fn run_periodic_pipeline(
    pipeline: Pipeline,
    category: String,
    group_id: i64,
    interval: std::time::Duration,
    lock: Arc<AsyncMutex<()>>,
    shutdown: ShutdownSignal,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.wait_for_trigger() => break,
        }
        if shutdown.requested() {
            break;
        }
        let _guard = lock.lock().await;
        pipeline.run_once(&category, group_id).await;
    }
}

async fn run_cache_cleanup(
    hash_cache: Arc<HashCache>,
    meta_cache: Arc<MetadataCache>,
    shutdown: ShutdownSignal,
) {
    loop {
        if shutdown.sleep(CLEANUP_INTERVAL).await.is_err() {
            return;
        }
        hash_cache.cleanup().await.ok();
        meta_cache.cleanup().await.ok();
    }
}

async fn run_maintenance(
    hash_cache: Arc<HashCache>,
    meta_cache: Arc<MetadataCache>,
    shutdown: ShutdownSignal,
) {
    loop {
        if shutdown.sleep(MAINTENANCE_INTERVAL).await.is_err() {
            return;
        }
        if let Err(e) = hash_cache.integrity_check().await {
            error!(error = %e, "hash cache integrity check failed");
        }
        if let Err(e) = meta_cache.integrity_check().await {
            error!(error = %e, "metadata cache integrity check failed");
        }
        if let Err(e) = hash_cache.analyze_and_vacuum().await {
            error!(error = %e, "hash cache analyze/vacuum failed");
        }
        if let Err(e) = meta_cache.analyze_and_vacuum().await {
            error!(error = %e, "metadata cache analyze/vacuum failed");
        }
    }
}
