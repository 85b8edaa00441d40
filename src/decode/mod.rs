//! Volume file decoders.
//!
//! A decoder turns uploaded bytes into [`VolumeData`]. Failures never
//! reach the store.

pub mod nifti;

use crate::types::{VolumeData, VolumeError};

pub use nifti::{encode_nifti, is_nifti_name, NiftiDecoder};

/// Error type for volume decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// File name does not carry a supported extension.
    #[error("Unsupported file type: {0} (expected .nii or .nii.gz)")]
    UnsupportedExtension(String),

    /// Gzip stream could not be inflated.
    #[error("Gzip decompression failed: {0}")]
    Gzip(String),

    /// Decompressed payload exceeds the configured limit.
    #[error("Decompressed volume exceeds {limit} bytes")]
    TooLarge {
        /// Limit in bytes.
        limit: usize,
    },

    /// Fewer bytes than a header.
    #[error("File too short for a NIfTI header: {0} bytes")]
    TooShort(usize),

    /// Header size field is not a known NIfTI value.
    #[error("Not a NIfTI file: bad header size")]
    BadHeader,

    /// Magic string is not a single-file NIfTI-1 magic.
    #[error("Unsupported NIfTI magic: {0:?}")]
    BadMagic(String),

    /// NIfTI-2 or another unsupported format version.
    #[error("Unsupported NIfTI version: {0}")]
    UnsupportedVersion(&'static str),

    /// Voxel datatype code is not supported.
    #[error("Unsupported NIfTI datatype code: {0}")]
    UnsupportedDatatype(i16),

    /// Image is not a 3D scalar volume.
    #[error("Expected a 3D volume, got dimensions {0:?}")]
    NotThreeDimensional(Vec<i64>),

    /// Voxel data ends before the declared size.
    #[error("Voxel data truncated: expected {expected} bytes, found {actual}")]
    Truncated {
        /// Bytes the header promises.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },

    /// Decoded array is empty.
    #[error(transparent)]
    Volume(#[from] VolumeError),
}

/// Decodes one file format.
pub trait VolumeDecoder: Send + Sync {
    /// Whether the decoder handles files with this name.
    fn accepts(&self, name: &str) -> bool;

    /// Decode a file's bytes.
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<VolumeData, DecodeError>;
}

/// Decode with the default NIfTI decoder.
pub fn decode(name: &str, bytes: &[u8]) -> Result<VolumeData, DecodeError> {
    NiftiDecoder::default().decode(name, bytes)
}
