//! Slice coordinate mapping shared by every code path that reads a plane.
//!
//! The browser-side viewer loads the raw file independently and scrubs
//! slices with the same slider as the preview. For both to show the same
//! anatomy at the same slider position, this module fixes:
//!
//! - axis → array dimension: sagittal 0, coronal 1, axial 2;
//! - index direction: reversed for sagittal and coronal, raw for axial;
//! - in-plane orientation: axial is rotated 90° clockwise, coronal 90°
//!   counter-clockwise, sagittal is mirrored left/right then rotated 90°
//!   clockwise.
//!
//! Nothing else in the crate computes array indices from slider positions.

use ndarray::{Array2, ArrayView2, ArrayView3, Axis as ArrayAxis};
use serde::Serialize;

use crate::types::{Axis, Shape};

/// A slider position resolved against a concrete volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlicePlane {
    /// Viewing axis.
    pub axis: Axis,
    /// Array dimension the plane is taken across.
    pub array_dim: usize,
    /// Slider position after clamping to `[0, extent - 1]`.
    pub display_index: usize,
    /// Array index along `array_dim`.
    pub array_index: usize,
}

/// Whether slider positions run against raw array order on this axis.
pub fn index_reversed(axis: Axis) -> bool {
    matches!(axis, Axis::Sagittal | Axis::Coronal)
}

/// Clamp a requested slider position and map it to an array index.
pub fn resolve_slice(axis: Axis, requested: i64, shape: Shape) -> SlicePlane {
    let extent = shape.along(axis);
    let last = extent.saturating_sub(1);
    let display_index = if requested <= 0 {
        0
    } else {
        usize::try_from(requested).unwrap_or(usize::MAX).min(last)
    };
    let array_index = if index_reversed(axis) {
        last - display_index
    } else {
        display_index
    };
    SlicePlane {
        axis,
        array_dim: axis.array_dim(),
        display_index,
        array_index,
    }
}

/// Rotate or mirror a raw plane into display orientation.
///
/// `raw` is indexed as `(first remaining array dim, second remaining array dim)`.
pub fn orient(axis: Axis, raw: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut view = raw.reversed_axes();
    match axis {
        // rot90(k=3): out[i, j] = raw[h - 1 - j, i]
        Axis::Axial => view.invert_axis(ArrayAxis(1)),
        // rot90(k=1): out[i, j] = raw[j, w - 1 - i]
        Axis::Coronal => view.invert_axis(ArrayAxis(0)),
        // rot90(fliplr, k=3): out[i, j] = raw[h - 1 - j, w - 1 - i]
        Axis::Sagittal => {
            view.invert_axis(ArrayAxis(0));
            view.invert_axis(ArrayAxis(1));
        }
    }
    view.as_standard_layout().into_owned()
}

/// Extract a plane from a volume in display orientation.
pub fn extract_plane(volume: ArrayView3<'_, f32>, plane: &SlicePlane) -> Array2<f32> {
    let raw = volume.index_axis(ArrayAxis(plane.array_dim), plane.array_index);
    orient(plane.axis, raw)
}
