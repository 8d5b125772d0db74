//! In-process remote store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::RemoteStore;
use crate::error::RemoteError;

#[derive(Debug)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A [`RemoteStore`] kept in process memory.
///
/// Share one instance (behind an `Arc`) between several coordinators to
/// simulate a fleet. Deadlines use the tokio clock, so tests running with
/// paused time can step past a TTL.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    reads: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|value| value.is_live(now))
            .count()
    }

    /// Returns true if no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if let Some(value) = entries.get(key) {
            if value.is_live(now) {
                return Ok(Some(value.data.clone()));
            }
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), RemoteError> {
        let stored = StoredValue {
            data: value.to_vec(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().insert(key.to_string(), stored);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, RemoteError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(|existing| existing.is_live(now)) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            StoredValue {
                data: value.to_vec(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
