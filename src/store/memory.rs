//! In-memory volume store with bounded capacity.
//!
//! Volumes live for the lifetime of the process unless the store evicts
//! them. Two policies bound memory:
//!
//! - **Capacity**: at most `max_volumes` entries; inserting beyond that
//!   evicts the least recently used id. A successful `get` counts as use.
//! - **TTL** (optional): entries older than `ttl` are treated as absent and
//!   purged on access or by [`InMemoryVolumeStore::purge_expired`].
//!
//! An evicted or expired id is indistinguishable from one that was never
//! uploaded.

use chrono::{Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{StoreError, VolumeStore};
use crate::types::{Volume, VolumeData, VolumeId};

/// Default maximum number of stored volumes.
pub const DEFAULT_MAX_VOLUMES: usize = 32;

/// Configuration for the in-memory store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of volumes kept at once.
    pub max_volumes: usize,
    /// Age after which a volume expires, if any.
    pub ttl: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_volumes: DEFAULT_MAX_VOLUMES,
            ttl: None,
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    /// Current number of volumes.
    pub len: usize,
    /// Maximum number of volumes.
    pub capacity: usize,
    /// Volumes evicted to make room.
    pub evicted: u64,
    /// Volumes dropped because they outlived the TTL.
    pub expired: u64,
}

/// In-memory volume store.
///
/// The LRU index is behind a mutex because lookups update recency; the
/// volumes themselves are shared immutably.
pub struct InMemoryVolumeStore {
    entries: Mutex<LruCache<VolumeId, Arc<Volume>>>,
    config: StoreConfig,
    evicted: AtomicU64,
    expired: AtomicU64,
}

impl InMemoryVolumeStore {
    /// Create a store with default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a store with custom configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_volumes).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            config,
            evicted: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        let entries = self.entries.lock();
        StoreStats {
            len: entries.len(),
            capacity: entries.cap().get(),
            evicted: self.evicted.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }

    /// Drop every expired volume. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let Some(ttl) = self.config.ttl else {
            return 0;
        };
        let mut entries = self.entries.lock();
        let stale: Vec<VolumeId> = entries
            .iter()
            .filter(|(_, volume)| is_expired(volume, ttl))
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            entries.pop(id);
        }
        self.expired.fetch_add(stale.len() as u64, Ordering::Relaxed);
        stale.len()
    }

    /// Check whether an id is live without touching its recency.
    pub fn contains(&self, id: &VolumeId) -> bool {
        let entries = self.entries.lock();
        match (entries.peek(id), self.config.ttl) {
            (Some(volume), Some(ttl)) => !is_expired(volume, ttl),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl Default for InMemoryVolumeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_expired(volume: &Volume, ttl: Duration) -> bool {
    Utc::now().signed_duration_since(volume.created_at()) >= ttl
}

impl VolumeStore for InMemoryVolumeStore {
    fn put(&self, data: VolumeData) -> Arc<Volume> {
        let mut entries = self.entries.lock();

        let mut id = VolumeId::generate();
        while entries.contains(&id) {
            id = VolumeId::generate();
        }

        let volume = Arc::new(Volume::new(id, data));
        if let Some((evicted_id, _)) = entries.push(id, Arc::clone(&volume)) {
            if evicted_id != id {
                self.evicted.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    volume_id = %evicted_id,
                    capacity = entries.cap().get(),
                    "volume evicted"
                );
            }
        }

        tracing::info!(
            volume_id = %id,
            shape = %volume.shape(),
            stored = entries.len(),
            "volume stored"
        );
        volume
    }

    fn get(&self, id: &VolumeId) -> Result<Arc<Volume>, StoreError> {
        let mut entries = self.entries.lock();

        if let Some(ttl) = self.config.ttl {
            if entries.peek(id).is_some_and(|v| is_expired(v, ttl)) {
                entries.pop(id);
                self.expired.fetch_add(1, Ordering::Relaxed);
                tracing::info!(volume_id = %id, "volume expired");
            }
        }

        entries
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VolumeMeta;
    use ndarray::Array3;

    fn make_data(fill: f32) -> VolumeData {
        VolumeData::new(Array3::from_elem((4, 5, 6), fill), VolumeMeta::default()).unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let store = InMemoryVolumeStore::new();
        let volume = store.put(make_data(1.0));

        let retrieved = store.get(&volume.id()).unwrap();
        assert_eq!(retrieved.id(), volume.id());
        assert_eq!(retrieved.shape().0, [4, 5, 6]);
        assert!(Arc::ptr_eq(&volume, &retrieved));
    }

    #[test]
    fn test_ids_are_fresh() {
        let store = InMemoryVolumeStore::new();
        let a = store.put(make_data(1.0));
        let b = store.put(make_data(1.0));
        assert_ne!(a.id(), b.id());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let store = InMemoryVolumeStore::new();
        let id = VolumeId::generate();
        assert_eq!(store.get(&id).unwrap_err(), StoreError::NotFound(id.to_string()));
        assert!(matches!(store.get_str("nope"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_get_str_accepts_display_form() {
        let store = InMemoryVolumeStore::new();
        let volume = store.put(make_data(2.0));
        let found = store.get_str(&volume.id().to_string()).unwrap();
        assert_eq!(found.id(), volume.id());
    }

    #[test]
    fn test_lru_eviction() {
        let store = InMemoryVolumeStore::with_config(StoreConfig {
            max_volumes: 2,
            ttl: None,
        });
        let a = store.put(make_data(1.0));
        let b = store.put(make_data(2.0));

        // Touch `a` so `b` becomes least recently used.
        store.get(&a.id()).unwrap();
        let c = store.put(make_data(3.0));

        assert!(store.get(&a.id()).is_ok());
        assert!(store.get(&c.id()).is_ok());
        assert!(matches!(store.get(&b.id()), Err(StoreError::NotFound(_))));

        let stats = store.stats();
        assert_eq!(stats.len, 2);
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.evicted, 1);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let store = InMemoryVolumeStore::with_config(StoreConfig {
            max_volumes: 0,
            ttl: None,
        });
        assert_eq!(store.stats().capacity, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let store = InMemoryVolumeStore::with_config(StoreConfig {
            max_volumes: 4,
            ttl: Some(Duration::zero()),
        });
        let volume = store.put(make_data(1.0));
        assert!(!store.contains(&volume.id()));
        assert!(matches!(store.get(&volume.id()), Err(StoreError::NotFound(_))));
        assert_eq!(store.stats().expired, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_ttl_not_yet_expired() {
        let store = InMemoryVolumeStore::with_config(StoreConfig {
            max_volumes: 4,
            ttl: Some(Duration::hours(1)),
        });
        let volume = store.put(make_data(1.0));
        assert!(store.contains(&volume.id()));
        assert!(store.get(&volume.id()).is_ok());
        assert_eq!(store.purge_expired(), 0);
    }

    #[test]
    fn test_purge_expired() {
        let store = InMemoryVolumeStore::with_config(StoreConfig {
            max_volumes: 4,
            ttl: Some(Duration::zero()),
        });
        store.put(make_data(1.0));
        store.put(make_data(2.0));
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_concurrent_puts() {
        let store = Arc::new(InMemoryVolumeStore::with_config(StoreConfig {
            max_volumes: 64,
            ttl: None,
        }));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.put(make_data(i as f32)).id())
            })
            .collect();
        let mut ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(store.len(), 8);
    }
}
