//! Single-file NIfTI-1 decoding (`.nii`, `.nii.gz`).
//!
//! Supports both byte orders, the common integer and float datatypes and
//! `scl_slope`/`scl_inter` scaling. Dimensions beyond the third must be 1.

use flate2::read::MultiGzDecoder;
use ndarray::{Array3, ShapeBuilder};
use std::io::Read;

use super::{DecodeError, VolumeDecoder};
use crate::types::{VolumeData, VolumeMeta};

/// NIfTI-1 header size.
const HEADER_SIZE: usize = 348;
/// NIfTI-2 header size.
const NIFTI2_HEADER_SIZE: i32 = 540;
/// Smallest voxel offset in a single-file image (header plus extension flag).
const MIN_VOX_OFFSET: usize = 352;

const DIM_OFFSET: usize = 40;
const DATATYPE_OFFSET: usize = 70;
const PIXDIM_OFFSET: usize = 76;
const VOX_OFFSET_OFFSET: usize = 108;
const SCL_SLOPE_OFFSET: usize = 112;
const SCL_INTER_OFFSET: usize = 116;
const MAGIC_OFFSET: usize = 344;

/// Default cap on decompressed size.
pub const DEFAULT_MAX_DECOMPRESSED_BYTES: usize = 2 * 1024 * 1024 * 1024;

/// Whether a file name carries a NIfTI extension.
pub fn is_nifti_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".nii") || lower.ends_with(".nii.gz")
}

/// NIfTI-1 decoder.
#[derive(Debug, Clone)]
pub struct NiftiDecoder {
    max_decompressed_bytes: usize,
}

impl Default for NiftiDecoder {
    fn default() -> Self {
        Self {
            max_decompressed_bytes: DEFAULT_MAX_DECOMPRESSED_BYTES,
        }
    }
}

impl NiftiDecoder {
    /// Create a decoder with a custom decompression limit.
    pub fn with_limit(max_decompressed_bytes: usize) -> Self {
        Self {
            max_decompressed_bytes,
        }
    }

    fn inflate(&self, bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let limit = self.max_decompressed_bytes;
        let mut out = Vec::new();
        MultiGzDecoder::new(bytes)
            .take(limit as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| DecodeError::Gzip(e.to_string()))?;
        if out.len() > limit {
            return Err(DecodeError::TooLarge { limit });
        }
        Ok(out)
    }
}

impl VolumeDecoder for NiftiDecoder {
    fn accepts(&self, name: &str) -> bool {
        is_nifti_name(name)
    }

    fn decode(&self, name: &str, bytes: &[u8]) -> Result<VolumeData, DecodeError> {
        if !self.accepts(name) {
            return Err(DecodeError::UnsupportedExtension(name.to_string()));
        }

        // Trust the content over the name: some tools gzip plain `.nii`.
        let inflated;
        let raw = if bytes.starts_with(&[0x1f, 0x8b]) {
            inflated = self.inflate(bytes)?;
            &inflated[..]
        } else {
            bytes
        };

        let header = Header::parse(raw)?;
        let data = header.read_voxels(raw)?;
        let volume = Array3::from_shape_vec(header.shape().f(), data)
            .map_err(|_| DecodeError::NotThreeDimensional(header.dims.to_vec()))?
            .as_standard_layout()
            .into_owned();

        let meta = VolumeMeta {
            spacing: header.spacing(),
            filename: Some(name.to_string()),
            datatype: Some(header.datatype.name().to_string()),
        };
        let data = VolumeData::new(volume, meta)?;

        tracing::debug!(
            filename = name,
            shape = %data.shape(),
            datatype = header.datatype.name(),
            big_endian = header.big_endian,
            "nifti decoded"
        );
        Ok(data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Datatype {
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl Datatype {
    fn from_code(code: i16) -> Result<Self, DecodeError> {
        Ok(match code {
            2 => Self::U8,
            4 => Self::I16,
            8 => Self::I32,
            16 => Self::F32,
            64 => Self::F64,
            256 => Self::I8,
            512 => Self::U16,
            768 => Self::U32,
            1024 => Self::I64,
            1280 => Self::U64,
            other => return Err(DecodeError::UnsupportedDatatype(other)),
        })
    }

    fn size(&self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::U16 => "uint16",
            Self::I32 => "int32",
            Self::U32 => "uint32",
            Self::I64 => "int64",
            Self::U64 => "uint64",
            Self::F32 => "float32",
            Self::F64 => "float64",
        }
    }
}

#[derive(Debug, Clone)]
struct Header {
    big_endian: bool,
    dims: [i64; 8],
    datatype: Datatype,
    pixdim: [f32; 8],
    vox_offset: usize,
    slope: f32,
    inter: f32,
}

/// Fixed-endian reads from a byte slice already checked for length.
struct Reader<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl Reader<'_> {
    fn array<const N: usize>(&self, at: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[at..at + N]);
        out
    }

    fn i16(&self, at: usize) -> i16 {
        let b = self.array::<2>(at);
        if self.big_endian {
            i16::from_be_bytes(b)
        } else {
            i16::from_le_bytes(b)
        }
    }

    fn f32(&self, at: usize) -> f32 {
        let b = self.array::<4>(at);
        if self.big_endian {
            f32::from_be_bytes(b)
        } else {
            f32::from_le_bytes(b)
        }
    }
}

/// Read a primitive in the reader's byte order.
macro_rules! endian {
    ($reader:expr, $at:expr, $ty:ty, $n:literal) => {{
        let b = $reader.array::<$n>($at);
        if $reader.big_endian {
            <$ty>::from_be_bytes(b)
        } else {
            <$ty>::from_le_bytes(b)
        }
    }};
}

impl Header {
    fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DecodeError::TooShort(bytes.len()));
        }

        let size_bytes = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let (le, be) = (i32::from_le_bytes(size_bytes), i32::from_be_bytes(size_bytes));
        let big_endian = if le == HEADER_SIZE as i32 {
            false
        } else if be == HEADER_SIZE as i32 {
            true
        } else if le == NIFTI2_HEADER_SIZE || be == NIFTI2_HEADER_SIZE {
            return Err(DecodeError::UnsupportedVersion("NIfTI-2"));
        } else {
            return Err(DecodeError::BadHeader);
        };

        let magic = &bytes[MAGIC_OFFSET..MAGIC_OFFSET + 4];
        if magic != b"n+1\0" {
            return Err(DecodeError::BadMagic(
                String::from_utf8_lossy(magic).trim_end_matches('\0').to_string(),
            ));
        }

        let reader = Reader { bytes, big_endian };
        let mut dims = [0i64; 8];
        for (i, d) in dims.iter_mut().enumerate() {
            *d = reader.i16(DIM_OFFSET + 2 * i) as i64;
        }
        let mut pixdim = [0f32; 8];
        for (i, p) in pixdim.iter_mut().enumerate() {
            *p = reader.f32(PIXDIM_OFFSET + 4 * i);
        }

        let rank = dims[0];
        let extents = &dims[1..=(rank.clamp(0, 7) as usize)];
        let valid = (3..=7).contains(&rank)
            && extents[..3].iter().all(|&d| d > 0)
            && extents[3..].iter().all(|&d| d == 1);
        if !valid {
            return Err(DecodeError::NotThreeDimensional(extents.to_vec()));
        }

        let datatype = Datatype::from_code(reader.i16(DATATYPE_OFFSET))?;
        let vox_offset = reader.f32(VOX_OFFSET_OFFSET);
        let vox_offset = if vox_offset.is_finite() && vox_offset > 0.0 {
            (vox_offset as usize).max(MIN_VOX_OFFSET)
        } else {
            MIN_VOX_OFFSET
        };

        Ok(Self {
            big_endian,
            dims,
            datatype,
            pixdim,
            vox_offset,
            slope: reader.f32(SCL_SLOPE_OFFSET),
            inter: reader.f32(SCL_INTER_OFFSET),
        })
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.dims[1] as usize,
            self.dims[2] as usize,
            self.dims[3] as usize,
        )
    }

    fn spacing(&self) -> Option<[f32; 3]> {
        let spacing = [self.pixdim[1], self.pixdim[2], self.pixdim[3]];
        spacing
            .iter()
            .all(|s| s.is_finite() && *s > 0.0)
            .then_some(spacing)
    }

    fn read_voxels(&self, bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
        let (x, y, z) = self.shape();
        let count = x * y * z;
        let width = self.datatype.size();
        let expected = count * width;
        let available = bytes.len().saturating_sub(self.vox_offset);
        if available < expected {
            return Err(DecodeError::Truncated {
                expected,
                actual: available,
            });
        }

        let reader = Reader {
            bytes: &bytes[self.vox_offset..self.vox_offset + expected],
            big_endian: self.big_endian,
        };
        let scale = self.slope.is_finite() && self.slope != 0.0;
        let (slope, inter) = if scale {
            (self.slope as f64, if self.inter.is_finite() { self.inter as f64 } else { 0.0 })
        } else {
            (1.0, 0.0)
        };

        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let at = i * width;
            let raw = match self.datatype {
                Datatype::U8 => reader.bytes[at] as f64,
                Datatype::I8 => reader.bytes[at] as i8 as f64,
                Datatype::I16 => reader.i16(at) as f64,
                Datatype::U16 => endian!(reader, at, u16, 2) as f64,
                Datatype::I32 => endian!(reader, at, i32, 4) as f64,
                Datatype::U32 => endian!(reader, at, u32, 4) as f64,
                Datatype::I64 => endian!(reader, at, i64, 8) as f64,
                Datatype::U64 => endian!(reader, at, u64, 8) as f64,
                Datatype::F32 => reader.f32(at) as f64,
                Datatype::F64 => endian!(reader, at, f64, 8),
            };
            out.push((raw * slope + inter) as f32);
        }
        Ok(out)
    }
}

/// Encode a volume as a little-endian single-file NIfTI-1 image with
/// float32 voxels.
pub fn encode_nifti(data: &Array3<f32>, spacing: [f32; 3]) -> Vec<u8> {
    let (x, y, z) = data.dim();
    let mut out = vec![0u8; MIN_VOX_OFFSET];
    out[0..4].copy_from_slice(&(HEADER_SIZE as i32).to_le_bytes());

    let dims: [i16; 8] = [3, x as i16, y as i16, z as i16, 1, 1, 1, 1];
    for (i, d) in dims.iter().enumerate() {
        let at = DIM_OFFSET + 2 * i;
        out[at..at + 2].copy_from_slice(&d.to_le_bytes());
    }
    out[DATATYPE_OFFSET..DATATYPE_OFFSET + 2].copy_from_slice(&16i16.to_le_bytes());
    out[DATATYPE_OFFSET + 2..DATATYPE_OFFSET + 4].copy_from_slice(&32i16.to_le_bytes());

    let pixdim: [f32; 8] = [1.0, spacing[0], spacing[1], spacing[2], 1.0, 1.0, 1.0, 1.0];
    for (i, p) in pixdim.iter().enumerate() {
        let at = PIXDIM_OFFSET + 4 * i;
        out[at..at + 4].copy_from_slice(&p.to_le_bytes());
    }
    out[VOX_OFFSET_OFFSET..VOX_OFFSET_OFFSET + 4]
        .copy_from_slice(&(MIN_VOX_OFFSET as f32).to_le_bytes());
    out[MAGIC_OFFSET..MAGIC_OFFSET + 4].copy_from_slice(b"n+1\0");

    // Voxels are stored with the first index varying fastest.
    out.reserve(x * y * z * 4);
    for v in data.t().iter() {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
