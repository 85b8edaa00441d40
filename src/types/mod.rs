//! Core types for the augmentation playground.

pub mod axis;
pub mod pipeline;
pub mod request;
pub mod transform;
pub mod volume;

pub use axis::Axis;
pub use pipeline::Pipeline;
pub use request::{ExportRequest, PreviewRequest, RequestError};
pub use transform::{Domain, ParamSet, ParamValue, TransformKind, TransformSpec};
pub use volume::{Shape, Volume, VolumeData, VolumeError, VolumeId, VolumeMeta};
