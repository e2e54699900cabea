use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key async mutexes. Waiters on one key are served in arrival order;
/// different keys never contend.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

pub struct KeyedGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    slot: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        let guard = Arc::clone(&slot).lock_owned().await;
        KeyedGuard {
            owner: self,
            key: key.to_string(),
            slot,
            guard: Some(guard),
        }
    }

    pub fn active_keys(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.owner.slots.lock();
        // map + this guard hold the only references: nobody is queued
        if Arc::strong_count(&self.slot) == 2 {
            if let Some(current) = slots.get(&self.key) {
                if Arc::ptr_eq(current, &self.slot) {
                    slots.remove(&self.key);
                }
            }
        }
    }
}
