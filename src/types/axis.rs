//! Anatomical slice axes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three canonical viewing axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Left–right; slices along array dimension 0.
    Sagittal,
    /// Anterior–posterior; slices along array dimension 1.
    Coronal,
    /// Inferior–superior; slices along array dimension 2.
    Axial,
}

impl Axis {
    /// All axes in array-dimension order.
    pub const ALL: [Axis; 3] = [Self::Sagittal, Self::Coronal, Self::Axial];

    /// Parse an axis name, ignoring case.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sagittal" => Some(Self::Sagittal),
            "coronal" => Some(Self::Coronal),
            "axial" => Some(Self::Axial),
            _ => None,
        }
    }

    /// Array dimension the axis indexes.
    pub fn array_dim(&self) -> usize {
        match self {
            Self::Sagittal => 0,
            Self::Coronal => 1,
            Self::Axial => 2,
        }
    }
}

impl Default for Axis {
    fn default() -> Self {
        Self::Axial
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sagittal => write!(f, "sagittal"),
            Self::Coronal => write!(f, "coronal"),
            Self::Axial => write!(f, "axial"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!(Axis::from_str("Axial"), Some(Axis::Axial));
        assert_eq!(Axis::from_str(" SAGITTAL "), Some(Axis::Sagittal));
        assert_eq!(Axis::from_str("transverse"), None);
    }

    #[test]
    fn test_array_dims_are_distinct() {
        let dims: Vec<_> = Axis::ALL.iter().map(Axis::array_dim).collect();
        assert_eq!(dims, vec![0, 1, 2]);
    }
}
