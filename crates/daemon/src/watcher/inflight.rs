//! Per-path guard serializing fetches
//!
//! Two OPENs of the same empty placeholder must not both download it. Each
//! fetch holds the path's guard; a second caller waits on the same lock,
//! then re-checks the file size and finds it already materialized.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Debug, Clone, Default)]
pub struct InflightGuard {
    slots: Slots,
}

impl InflightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder owns `name`, then take it.
    pub async fn acquire(&self, name: &str) -> InflightPermit {
        // the slot is cloned under the map lock, so release can tell
        // whether anyone is still queued on it
        let slot = self
            .slots
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone();
        let guard = slot.lock_owned().await;

        InflightPermit {
            name: name.to_string(),
            guard: Some(guard),
            slots: self.slots.clone(),
        }
    }

    /// Whether `name` is held or awaited by anyone
    pub fn is_pending(&self, name: &str) -> bool {
        self.slots.lock().contains_key(name)
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Ownership of one path's fetch slot, released on drop
#[derive(Debug)]
pub struct InflightPermit {
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Slots,
}

impl Drop for InflightPermit {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(&self.name) {
            // only the map itself still references the slot
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.name);
            }
        }
    }
}
