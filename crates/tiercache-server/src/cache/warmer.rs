//! Scheduled recomputation of expensive resources.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tiercache_core::Resource;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::coordinator::CacheCoordinator;
use crate::cache::lock::{Flight, FlightError, SingleFlightLock};

/// Computes the fresh value of a resource.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Produces the encoded value.
    async fn produce(&self) -> anyhow::Result<Vec<u8>>;

    /// Returns the name of this producer, for logging.
    fn name(&self) -> &str;
}

/// A resource recomputed on a fixed interval.
#[derive(Clone)]
pub struct WarmJob {
    pub resource: Resource,
    pub interval: Duration,
    pub lock_ttl: Duration,
    pub producer: Arc<dyn Producer>,
}

impl WarmJob {
    /// Creates a job that runs once per resource TTL.
    pub fn new(resource: Resource, producer: Arc<dyn Producer>) -> Self {
        let ttl = resource.spec().ttl();
        Self {
            resource,
            interval: ttl,
            lock_ttl: ttl,
            producer,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_lock_ttl(mut self, lock_ttl: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self
    }

    /// Lock key shared by every instance running this job.
    pub fn lock_key(&self) -> String {
        format!("recompute:{}", self.resource.key())
    }
}

/// Configuration for failure backoff.
#[derive(Debug, Clone)]
pub struct WarmerConfig {
    /// Backoff multiplier for failures.
    pub backoff_multiplier: f64,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl WarmerConfig {
    /// Delay before the next run after a failure.
    fn next_delay(&self, current: Duration, interval: Duration) -> Duration {
        let grown = Duration::from_secs_f64(current.as_secs_f64() * self.backoff_multiplier);
        grown.min(self.max_backoff.max(interval))
    }
}

/// Handle for controlling a running warmer.
pub struct WarmerHandle {
    /// Sender to signal shutdown.
    shutdown_tx: watch::Sender<bool>,
}

impl WarmerHandle {
    /// Signals every job loop to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for WarmerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs [`WarmJob`]s, each guarded by a fleet-wide single-flight lock so
/// only one instance recomputes a resource at a time.
pub struct CacheWarmer {
    coordinator: CacheCoordinator,
    lock: SingleFlightLock,
    jobs: Vec<WarmJob>,
    config: WarmerConfig,
}

impl CacheWarmer {
    pub fn new(coordinator: CacheCoordinator, lock: SingleFlightLock) -> Self {
        Self {
            coordinator,
            lock,
            jobs: Vec::new(),
            config: WarmerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WarmerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add_job(mut self, job: WarmJob) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn jobs(&self) -> &[WarmJob] {
        &self.jobs
    }

    /// Runs one job now: produce then store, if the lock is free.
    ///
    /// A skipped run means another instance holds the lock.
    pub async fn run_once(&self, job: &WarmJob) -> Result<Flight<()>, FlightError> {
        let lock_key = job.lock_key();

        self.lock
            .run(&lock_key, job.lock_ttl, || async {
                let value = job.producer.produce().await?;
                self.coordinator.set(&job.resource, value).await?;
                Ok(())
            })
            .await
    }

    /// Spawns one loop per job. Each job runs immediately, then on its
    /// interval.
    pub fn start(self) -> WarmerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let warmer = Arc::new(self);

        info!(jobs = warmer.jobs.len(), "Starting cache warmer");
        for job in warmer.jobs.clone() {
            tokio::spawn(Arc::clone(&warmer).run_job(job, shutdown_rx.clone()));
        }

        WarmerHandle { shutdown_tx }
    }

    async fn run_job(self: Arc<Self>, job: WarmJob, mut shutdown_rx: watch::Receiver<bool>) {
        let mut delay = job.interval;

        loop {
            match self.run_once(&job).await {
                Ok(Flight::Completed(())) => {
                    delay = job.interval;
                    debug!(key = %job.resource, producer = job.producer.name(), "resource warmed");
                },
                Ok(Flight::Skipped) => {
                    delay = job.interval;
                    debug!(key = %job.resource, "warm run skipped, lock held elsewhere");
                },
                Err(e) => {
                    delay = self.config.next_delay(delay, job.interval);
                    warn!(key = %job.resource, error = %e, retry_in = ?delay, "warm run failed");
                },
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!(key = %job.resource, "Warm job shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LocalCache, LocalCacheConfig};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tiercache_remote::{MemoryBus, MemoryStore, RemoteStore};

    struct CountingProducer {
        calls: AtomicU32,
        fail: bool,
    }

    impl CountingProducer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Producer for CountingProducer {
        async fn produce(&self) -> anyhow::Result<Vec<u8>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                anyhow::bail!("upstream unavailable");
            }
            Ok(format!("v{n}").into_bytes())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn warmer(store: Arc<MemoryStore>) -> CacheWarmer {
        let coordinator = CacheCoordinator::new(
            Arc::new(LocalCache::new(LocalCacheConfig::default())),
            store.clone(),
            Arc::new(MemoryBus::new()),
        );
        CacheWarmer::new(coordinator, SingleFlightLock::new(store))
    }

    #[test]
    fn test_job_defaults_follow_resource_ttl() {
        let job = WarmJob::new(Resource::Economics, CountingProducer::new(false));

        assert_eq!(job.interval, Duration::from_secs(600));
        assert_eq!(job.lock_ttl, Duration::from_secs(600));
        assert_eq!(job.lock_key(), "recompute:economics");
    }

    #[test]
    fn test_next_delay_doubles_and_caps() {
        let config = WarmerConfig::default();
        let interval = Duration::from_secs(60);

        assert_eq!(config.next_delay(interval, interval), Duration::from_secs(120));
        assert_eq!(
            config.next_delay(Duration::from_secs(200), interval),
            Duration::from_secs(300)
        );
        // Never below the regular interval
        let hourly = Duration::from_secs(3600);
        assert_eq!(config.next_delay(hourly, hourly), hourly);
    }

    #[tokio::test]
    async fn test_run_once_stores_value() {
        let store = Arc::new(MemoryStore::new());
        let warmer = warmer(store.clone());
        let producer = CountingProducer::new(false);
        let job = WarmJob::new(Resource::Nodes, producer.clone());

        let flight = warmer.run_once(&job).await.unwrap();

        assert_eq!(flight, Flight::Completed(()));
        assert_eq!(store.get("nodes").await.unwrap(), Some(b"v1".to_vec()));
        assert!(store.get("recompute:nodes").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_once_skips_when_locked() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_if_absent("recompute:nodes", b"true", Duration::from_secs(60))
            .await
            .unwrap();
        let warmer = warmer(store.clone());
        let producer = CountingProducer::new(false);

        let flight = warmer
            .run_once(&WarmJob::new(Resource::Nodes, producer.clone()))
            .await
            .unwrap();

        assert!(flight.is_skipped());
        assert_eq!(producer.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_once_failure_releases_lock() {
        let store = Arc::new(MemoryStore::new());
        let warmer = warmer(store.clone());
        let job = WarmJob::new(Resource::Nodes, CountingProducer::new(true));

        let result = warmer.run_once(&job).await;

        assert!(matches!(result, Err(FlightError::Action { .. })));
        assert!(store.get("recompute:nodes").await.unwrap().is_none());
        assert!(store.get("nodes").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_on_interval_until_stopped() {
        let store = Arc::new(MemoryStore::new());
        let producer = CountingProducer::new(false);
        let job = WarmJob::new(Resource::ActiveShards, producer.clone())
            .with_interval(Duration::from_secs(10));

        let handle = warmer(store.clone()).add_job(job).start();
        tokio::time::sleep(Duration::from_secs(25)).await;
        handle.stop();

        let runs = producer.calls();
        assert_eq!(runs, 3);
        assert_eq!(store.get("shards").await.unwrap(), Some(b"v3".to_vec()));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(producer.calls(), runs);
    }

    struct SlowProducer;

    #[async_trait]
    impl Producer for SlowProducer {
        async fn produce(&self) -> anyhow::Result<Vec<u8>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(b"late".to_vec())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_cancels_producer_past_lock_ttl() {
        let store = Arc::new(MemoryStore::new());
        let job = WarmJob::new(Resource::Nodes, Arc::new(SlowProducer))
            .with_lock_ttl(Duration::from_secs(2));
        assert_eq!(job.lock_ttl, Duration::from_secs(2));

        let result = warmer(store.clone()).run_once(&job).await;

        assert!(matches!(result, Err(FlightError::Expired { .. })));
        assert!(store.get("nodes").await.unwrap().is_none());
    }
}
