//! Tiercache Server binary.

use std::sync::Arc;

use anyhow::Context;
use tiercache_remote::{Bus, MemoryBus, MemoryStore, RedisBus, RedisStore, RemoteStore, store};
use tiercache_server::cache::{CacheCoordinator, InvalidationListener, LocalCache};
use tiercache_server::metrics::{CacheMetrics, init_metrics};
use tiercache_server::{AppConfig, AppState, run_server};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load(None).context("failed to load configuration")?;
    let addr = config.socket_addr()?;

    tracing::info!(
        "Starting Tiercache Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let prometheus = init_metrics().context("failed to install metrics recorder")?;

    let (remote, bus): (Arc<dyn RemoteStore>, Arc<dyn Bus>) = match config.remote()? {
        Some(remote_config) => {
            tracing::info!(pool_size = remote_config.pool_size(), "Using Redis backend");
            let pool = store::create_pool(&remote_config)?;
            let redis_store = RedisStore::with_pool(pool.clone(), remote_config.clone());
            if let Err(e) = redis_store.health_check().await {
                tracing::warn!(error = %e, "Redis not reachable yet, reads will fall back to misses");
            }
            let redis_bus = RedisBus::with_pool(pool, remote_config)?;
            let remote: Arc<dyn RemoteStore> = Arc::new(redis_store);
            let bus: Arc<dyn Bus> = Arc::new(redis_bus);
            (remote, bus)
        },
        None => {
            tracing::info!("No redis_url configured, running single-node in memory");
            let remote: Arc<dyn RemoteStore> = Arc::new(MemoryStore::new());
            let bus: Arc<dyn Bus> = Arc::new(MemoryBus::new());
            (remote, bus)
        },
    };

    let local = Arc::new(LocalCache::with_metrics(
        config.local_cache(),
        CacheMetrics::new(),
    ));
    let coordinator = CacheCoordinator::new(local, remote, bus).with_topic(&config.topic);
    tracing::info!("Instance id: {}", coordinator.instance_id());

    let listener = InvalidationListener::new(&coordinator).with_config(config.listener());
    let listener_status = listener.status();
    let listener_handle = listener
        .start()
        .await
        .context("failed to subscribe to invalidation topic")?;

    let state = AppState::new(coordinator, listener_status);
    run_server(addr, state, prometheus).await?;

    listener_handle.stop().await;
    tracing::info!("Tiercache Server stopped");
    Ok(())
}
