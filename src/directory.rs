//! Device directory: hardware identifier -> device id, with a
//! bounded-staleness cache.
//!
//! The cache holds a full snapshot of the backing store and refreshes it at
//! most once per staleness window. A refresh builds a complete new map and
//! swaps it in atomically, so concurrent readers see either the old or the
//! new snapshot, never a mix.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::{Device, DeviceId};

/// Default staleness window, seconds.
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_secs(300);

/// Backing store the directory refreshes from.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Load the complete device list.
    async fn load_devices(&self) -> Result<Vec<Device>>;
}

struct Snapshot {
    by_unique_id: Arc<HashMap<String, DeviceId>>,
    loaded_at: Instant,
}

/// Snapshot cache over a [`DeviceStore`].
pub struct DeviceDirectory {
    store: Arc<dyn DeviceStore>,
    refresh_delay: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl DeviceDirectory {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self::with_refresh_delay(store, DEFAULT_REFRESH_DELAY)
    }

    pub fn with_refresh_delay(store: Arc<dyn DeviceStore>, refresh_delay: Duration) -> Self {
        Self {
            store,
            refresh_delay,
            snapshot: RwLock::new(None),
        }
    }

    /// Resolve a hardware identifier to an internal device id.
    ///
    /// Returns `Ok(None)` when the identifier is unknown, which callers
    /// must treat as non-fatal. Store errors surface only when a refresh
    /// was actually needed.
    pub async fn resolve(&self, unique_id: &str) -> Result<Option<DeviceId>> {
        if let Some(current) = self.current_if_fresh().await {
            return Ok(current.get(unique_id).copied());
        }

        let map = self.refresh().await?;
        Ok(map.get(unique_id).copied())
    }

    /// Replace the whole snapshot from the backing store.
    pub async fn refresh(&self) -> Result<Arc<HashMap<String, DeviceId>>> {
        let devices = self.store.load_devices().await?;
        let map: HashMap<String, DeviceId> = devices
            .into_iter()
            .map(|device| (device.unique_id, device.id))
            .collect();
        let map = Arc::new(map);

        let mut guard = self.snapshot.write().await;
        *guard = Some(Snapshot {
            by_unique_id: map.clone(),
            loaded_at: Instant::now(),
        });
        Ok(map)
    }

    async fn current_if_fresh(&self) -> Option<Arc<HashMap<String, DeviceId>>> {
        let guard = self.snapshot.read().await;
        guard.as_ref().and_then(|snapshot| {
            (snapshot.loaded_at.elapsed() < self.refresh_delay)
                .then(|| snapshot.by_unique_id.clone())
        })
    }
}
