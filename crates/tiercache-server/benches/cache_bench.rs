use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tiercache_core::Resource;
use tiercache_remote::{MemoryBus, MemoryStore};
use tiercache_server::cache::{CacheCoordinator, LocalCache, LocalCacheConfig};
use tokio::runtime::Runtime;

const HOUR: Duration = Duration::from_secs(3600);

/// Crea un payload de prueba de N bytes
fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Benchmark: LocalCache get (hit)
fn bench_local_get_hit(c: &mut Criterion) {
    let cache = LocalCache::new(LocalCacheConfig::default());
    cache.set("nodes", payload(4096), HOUR);

    c.bench_function("local_get_hit", |b| {
        b.iter(|| std::hint::black_box(cache.get("nodes")));
    });
}

/// Benchmark: LocalCache get (miss)
fn bench_local_get_miss(c: &mut Criterion) {
    let cache = LocalCache::new(LocalCacheConfig::default());

    c.bench_function("local_get_miss", |b| {
        b.iter(|| std::hint::black_box(cache.get("nonexistent")));
    });
}

/// Benchmark: LocalCache set con diferentes tamanos de payload
fn bench_local_set_varying_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_set_sizes");

    for size in [64, 4096, 65536].iter() {
        let cache = LocalCache::new(LocalCacheConfig::default());
        let value: Arc<[u8]> = payload(*size).into();
        let counter = AtomicU64::new(0);

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _size| {
            b.iter(|| {
                let count = counter.fetch_add(1, Ordering::Relaxed);
                cache.set(&format!("txCount:erd{count}"), Arc::clone(&value), HOUR);
            });
        });
    }

    group.finish();
}

/// Benchmark: LocalCache refresh de una entry viva
fn bench_local_refresh(c: &mut Criterion) {
    let cache = LocalCache::new(LocalCacheConfig::default());
    cache.set("shards", payload(64), HOUR);

    c.bench_function("local_refresh", |b| {
        b.iter(|| std::hint::black_box(cache.refresh("shards", HOUR)));
    });
}

/// Benchmark: Coordinator get servido por la cache local
fn bench_coordinator_get_local(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let coordinator = CacheCoordinator::new(
        Arc::new(LocalCache::new(LocalCacheConfig::default())),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryBus::new()),
    );

    rt.block_on(async {
        coordinator
            .set(&Resource::Nodes, payload(4096))
            .await
            .unwrap();
    });

    c.bench_function("coordinator_get_local", |b| {
        b.to_async(&rt).iter(|| async {
            std::hint::black_box(coordinator.get(&Resource::Nodes).await)
        });
    });
}

/// Benchmark: Coordinator get con miss local y hit remoto
fn bench_coordinator_get_remote(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let coordinator = CacheCoordinator::new(
        Arc::new(LocalCache::new(LocalCacheConfig::default())),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryBus::new()),
    );

    rt.block_on(async {
        coordinator
            .set(&Resource::Providers, payload(4096))
            .await
            .unwrap();
    });

    c.bench_function("coordinator_get_remote", |b| {
        b.to_async(&rt).iter(|| async {
            coordinator.local().delete("providers");
            std::hint::black_box(coordinator.get(&Resource::Providers).await)
        });
    });
}

criterion_group!(
    benches,
    bench_local_get_hit,
    bench_local_get_miss,
    bench_local_set_varying_sizes,
    bench_local_refresh,
    bench_coordinator_get_local,
    bench_coordinator_get_remote,
);
criterion_main!(benches);
