//! Volume types.

use chrono::{DateTime, Utc};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::axis::Axis;

/// Opaque identifier of a stored volume.
///
/// Rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VolumeId(Uuid);

impl VolumeId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse an id from its hex (simple or hyphenated) form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Volume dimensions, one positive extent per array axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape(pub [usize; 3]);

impl Shape {
    /// Extent along an array dimension (0, 1 or 2).
    pub fn dim(&self, array_dim: usize) -> usize {
        self.0[array_dim]
    }

    /// Extent along an anatomical axis.
    pub fn along(&self, axis: Axis) -> usize {
        self.0[axis.array_dim()]
    }

    /// Total voxel count.
    pub fn voxels(&self) -> usize {
        self.0.iter().product()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.0[0], self.0[1], self.0[2])
    }
}

/// Error constructing volume data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VolumeError {
    /// At least one dimension is zero.
    #[error("Volume has an empty dimension: {0}")]
    EmptyDimension(Shape),
}

/// Optional spatial metadata carried alongside the voxels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeMeta {
    /// Voxel size along each array axis, in millimetres.
    pub spacing: Option<[f32; 3]>,
    /// Name of the file the volume was decoded from.
    pub filename: Option<String>,
    /// On-disk datatype before conversion to `f32`.
    pub datatype: Option<String>,
}

/// Decoded voxels and metadata, not yet stored.
#[derive(Debug, Clone)]
pub struct VolumeData {
    data: Array3<f32>,
    meta: VolumeMeta,
}

impl VolumeData {
    /// Wrap a decoded array. Every dimension must be positive.
    pub fn new(data: Array3<f32>, meta: VolumeMeta) -> Result<Self, VolumeError> {
        let (x, y, z) = data.dim();
        if x == 0 || y == 0 || z == 0 {
            return Err(VolumeError::EmptyDimension(Shape([x, y, z])));
        }
        Ok(Self { data, meta })
    }

    /// Shape of the voxel array.
    pub fn shape(&self) -> Shape {
        let (x, y, z) = self.data.dim();
        Shape([x, y, z])
    }

    /// Voxel array.
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Metadata.
    pub fn meta(&self) -> &VolumeMeta {
        &self.meta
    }
}

/// A stored, immutable volume.
#[derive(Debug, Clone)]
pub struct Volume {
    id: VolumeId,
    data: Array3<f32>,
    meta: VolumeMeta,
    created_at: DateTime<Utc>,
}

impl Volume {
    /// Assign an id to decoded data.
    pub fn new(id: VolumeId, data: VolumeData) -> Self {
        Self {
            id,
            data: data.data,
            meta: data.meta,
            created_at: Utc::now(),
        }
    }

    /// The volume's id.
    pub fn id(&self) -> VolumeId {
        self.id
    }

    /// Shape of the voxel array.
    pub fn shape(&self) -> Shape {
        let (x, y, z) = self.data.dim();
        Shape([x, y, z])
    }

    /// Voxel array.
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Metadata.
    pub fn meta(&self) -> &VolumeMeta {
        &self.meta
    }

    /// When the volume was stored.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
