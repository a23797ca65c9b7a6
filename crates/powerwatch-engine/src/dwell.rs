//! Dwell tracker — how long has an appliance been continuously ON?
//!
//! The answer is kept in the shared store (one [`DwellRecord`] per
//! appliance) rather than in process memory, so independent invocations see
//! the same ON-streaks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use powerwatch_state::{DwellRecord, Layout, SharedStore, StoreResult};

/// Result of observing an appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwellState {
    /// No record exists (only reported by [`DwellTracker::peek`]).
    NotTracking,
    /// First ON observation; a record was just created.
    JustStarted,
    /// ON with an existing record, for this long.
    Dwelling(Duration),
    /// Observed OFF; any record is gone.
    Cleared,
}

/// Store-backed per-appliance ON-streak bookkeeping.
#[derive(Clone)]
pub struct DwellTracker {
    store: Arc<dyn SharedStore>,
    layout: Layout,
}

impl DwellTracker {
    pub fn new(store: Arc<dyn SharedStore>, layout: Layout) -> Self {
        Self { store, layout }
    }

    /// Fold one power observation into the appliance's dwell record.
    ///
    /// OFF deletes the record. ON without a record starts one at `now`. ON
    /// with a record reports the elapsed time and leaves the record alone.
    pub async fn observe(
        &self,
        appliance: &str,
        powered_now: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<DwellState> {
        let path = self.layout.dwell_path(appliance);

        if !powered_now {
            let existed = self.store.delete(&path).await?;
            if existed {
                debug!(%appliance, "appliance off, dwell record cleared");
            }
            return Ok(DwellState::Cleared);
        }

        match self.store.get(&path).await? {
            None => {
                self.start(&path, now).await?;
                debug!(%appliance, since = %now, "dwell started");
                Ok(DwellState::JustStarted)
            }
            Some(raw) => match DwellRecord::from_value(&raw) {
                Some(record) => Ok(DwellState::Dwelling(elapsed_since(record.since, now))),
                None => {
                    warn!(%appliance, value = %raw, "unreadable dwell record, restarting streak");
                    self.start(&path, now).await?;
                    Ok(DwellState::JustStarted)
                }
            },
        }
    }

    /// Read-only view of an appliance's dwell state at `now`.
    pub async fn peek(&self, appliance: &str, now: DateTime<Utc>) -> StoreResult<DwellState> {
        Ok(match self.record(appliance).await? {
            Some(record) => DwellState::Dwelling(elapsed_since(record.since, now)),
            None => DwellState::NotTracking,
        })
    }

    /// The stored record, if any and readable.
    pub async fn record(&self, appliance: &str) -> StoreResult<Option<DwellRecord>> {
        let raw = self.store.get(&self.layout.dwell_path(appliance)).await?;
        Ok(raw.as_ref().and_then(DwellRecord::from_value))
    }

    /// Drop the appliance's record. Returns true if one existed.
    pub async fn clear(&self, appliance: &str) -> StoreResult<bool> {
        self.store.delete(&self.layout.dwell_path(appliance)).await
    }

    async fn start(&self, path: &str, now: DateTime<Utc>) -> StoreResult<()> {
        self.store.set(path, DwellRecord::new(now).to_value()).await
    }
}

/// `now - since`, clamped at zero when the clock has gone backwards.
fn elapsed_since(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}
