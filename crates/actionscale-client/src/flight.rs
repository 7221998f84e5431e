//! Per-key single-flight locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

fn lock_map(locks: &LockMap) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Hands out one async lock per key. Cloning shares the locks.
///
/// A disabled group never blocks. A key's lock lives only while someone
/// holds or waits on it.
#[derive(Debug, Clone, Default)]
pub struct FlightGroup {
    locks: Option<LockMap>,
}

impl FlightGroup {
    pub fn new() -> Self {
        Self {
            locks: Some(Arc::new(Mutex::new(HashMap::new()))),
        }
    }

    pub fn disabled() -> Self {
        Self { locks: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.locks.is_some()
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.locks.as_ref().map_or(0, |locks| lock_map(locks).len())
    }

    /// Wait for exclusive access to `key`. `None` when disabled.
    pub async fn acquire(&self, key: &str) -> Option<FlightGuard> {
        let locks = self.locks.as_ref()?;
        let lock = lock_map(locks)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        Some(FlightGuard {
            locks: locks.clone(),
            guard: Some(guard),
        })
    }
}

/// Exclusive access to one key. Dropping it releases the key and forgets
/// every lock nobody else references.
#[derive(Debug)]
pub struct FlightGuard {
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        // Release before pruning so our own reference is gone.
        drop(self.guard.take());
        // The map's own reference is the only one left on an idle lock.
        // Clones are only taken under the map lock, so none can appear here.
        lock_map(&self.locks).retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
