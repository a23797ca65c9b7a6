//! Per-appliance serialization.
//!
//! Overlapping cycles (a timer tick racing an HTTP trigger, say) must not
//! run two read-decide-commit sequences for the same appliance at once.
//! Different appliances never contend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutexes, one per appliance id.
#[derive(Default)]
pub struct ApplianceLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ApplianceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `appliance`. Released on drop.
    pub async fn acquire(&self, appliance: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(appliance.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }

    /// Drop idle slots for appliances that are no longer known.
    pub async fn retain_known(&self, known: &HashSet<String>) {
        let mut slots = self.slots.lock().await;
        slots.retain(|id, slot| known.contains(id) || Arc::strong_count(slot) > 1);
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}
