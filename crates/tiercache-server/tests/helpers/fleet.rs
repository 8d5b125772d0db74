//! Simulated fleet of instances sharing one store and one bus.

use std::sync::Arc;
use std::time::Duration;

use tiercache_remote::{MemoryBus, MemoryStore};
use tiercache_server::cache::{
    CacheCoordinator, InvalidationListener, ListenerHandle, LocalCache, LocalCacheConfig,
    SingleFlightLock,
};

/// Una instancia: cache local propia, listener corriendo.
pub struct Instance {
    pub coordinator: CacheCoordinator,
    pub lock: SingleFlightLock,
    pub listener: ListenerHandle,
}

impl Instance {
    pub fn local(&self) -> &LocalCache {
        self.coordinator.local()
    }
}

/// N instancias conectadas al mismo store remoto y al mismo bus.
pub struct Fleet {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<MemoryBus>,
    pub instances: Vec<Instance>,
}

impl Fleet {
    pub async fn start(size: usize) -> Self {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryBus::new());
        let mut instances = Vec::with_capacity(size);

        for _ in 0..size {
            let local = Arc::new(LocalCache::new(LocalCacheConfig::default()));
            let coordinator = CacheCoordinator::new(local, store.clone(), bus.clone());
            let lock = SingleFlightLock::with_metrics(store.clone(), coordinator.metrics().clone());
            let listener = InvalidationListener::new(&coordinator)
                .start()
                .await
                .expect("listener subscribes");
            instances.push(Instance {
                coordinator,
                lock,
                listener,
            });
        }

        Self {
            store,
            bus,
            instances,
        }
    }

    pub fn instance(&self, index: usize) -> &Instance {
        &self.instances[index]
    }

    pub async fn shutdown(self) {
        for instance in self.instances {
            instance.listener.stop().await;
        }
    }
}

/// Espera hasta que `condition` se cumpla, o falla tras ~1s.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
