//! Volume storage backends.

pub mod memory;

use std::sync::Arc;

use crate::types::{Volume, VolumeData, VolumeId};

/// Error type for store lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Volume id absent, expired, evicted or never uploaded.
    #[error("Volume not found: {0}")]
    NotFound(String),
}

/// Trait for volume storage backends.
///
/// Stored volumes are immutable; every reader shares the same `Arc`.
pub trait VolumeStore: Send + Sync {
    /// Store decoded data under a fresh id. Ids are never reused.
    fn put(&self, data: VolumeData) -> Arc<Volume>;

    /// Fetch a volume by id.
    fn get(&self, id: &VolumeId) -> Result<Arc<Volume>, StoreError>;

    /// Fetch a volume by its textual id.
    ///
    /// Text that is not a valid id cannot name a stored volume, so it is
    /// reported as not found.
    fn get_str(&self, id: &str) -> Result<Arc<Volume>, StoreError> {
        let parsed = VolumeId::parse(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.get(&parsed)
    }

    /// Number of live volumes.
    fn len(&self) -> usize;

    /// Whether the store holds no volumes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub use memory::{InMemoryVolumeStore, StoreConfig, StoreStats};
