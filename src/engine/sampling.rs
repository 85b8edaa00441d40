//! Random draws, interpolation and filtering shared by the transforms.

use ndarray::{Array3, ArrayView3, Axis, Zip};
use rand::Rng;
use rand_chacha::ChaCha20Rng;

/// Points this far outside the grid still read the nearest edge voxel.
const EDGE_TOLERANCE: f64 = 1e-6;

/// Draw from `U(lo, hi)`. A degenerate interval returns `lo`.
pub fn uniform(rng: &mut ChaCha20Rng, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

/// Draw from `U(-limit, limit)`.
pub fn symmetric(rng: &mut ChaCha20Rng, limit: f64) -> f64 {
    uniform(rng, -limit.abs(), limit.abs())
}

/// Draw an integer from `[lo, hi]`. A degenerate interval returns `lo`.
pub fn uniform_int(rng: &mut ChaCha20Rng, lo: usize, hi: usize) -> usize {
    if hi > lo {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

/// Standard normal draw via Box-Muller.
pub fn standard_normal(rng: &mut ChaCha20Rng) -> f64 {
    // 1 - U keeps the argument of ln in (0, 1].
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Minimum finite value, or zero for an all non-finite volume.
pub fn finite_min(volume: ArrayView3<'_, f32>) -> f32 {
    let min = volume
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::INFINITY, f32::min);
    if min.is_finite() {
        min
    } else {
        0.0
    }
}

/// Minimum and maximum finite values, if any.
pub fn finite_range(volume: ArrayView3<'_, f32>) -> Option<(f32, f32)> {
    volume
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Geometric center of a volume in voxel coordinates.
pub fn center(dim: (usize, usize, usize)) -> [f64; 3] {
    [
        (dim.0 as f64 - 1.0) / 2.0,
        (dim.1 as f64 - 1.0) / 2.0,
        (dim.2 as f64 - 1.0) / 2.0,
    ]
}

/// Trilinear interpolation at a continuous voxel coordinate.
///
/// Points outside the grid read `fill`.
pub fn trilinear(volume: ArrayView3<'_, f32>, point: [f64; 3], fill: f32) -> f32 {
    let (nx, ny, nz) = volume.dim();
    let dims = [nx, ny, nz];

    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    let mut frac = [0f64; 3];
    for axis in 0..3 {
        let max = (dims[axis] - 1) as f64;
        let c = point[axis];
        // Also rejects NaN.
        if !(c >= -EDGE_TOLERANCE && c <= max + EDGE_TOLERANCE) {
            return fill;
        }
        let c = c.clamp(0.0, max);
        let base = c.floor() as usize;
        lo[axis] = base;
        hi[axis] = (base + 1).min(dims[axis] - 1);
        frac[axis] = c - base as f64;
    }

    let mut acc = 0.0f64;
    for corner in 0..8 {
        let mut weight = 1.0;
        let mut idx = [0usize; 3];
        for axis in 0..3 {
            if corner & (1 << axis) == 0 {
                weight *= 1.0 - frac[axis];
                idx[axis] = lo[axis];
            } else {
                weight *= frac[axis];
                idx[axis] = hi[axis];
            }
        }
        if weight > 0.0 {
            acc += weight * volume[[idx[0], idx[1], idx[2]]] as f64;
        }
    }
    acc as f32
}

/// Resample a volume by pulling each output voxel from `map(output)`.
pub fn resample<F>(volume: ArrayView3<'_, f32>, fill: f32, map: F) -> Array3<f32>
where
    F: Fn([f64; 3]) -> [f64; 3],
{
    Array3::from_shape_fn(volume.dim(), |(i, j, k)| {
        trilinear(volume, map([i as f64, j as f64, k as f64]), fill)
    })
}

/// 3x3 rotation matrix from Euler angles in degrees, applied x then y then z.
pub fn rotation_matrix(degrees: [f64; 3]) -> [[f64; 3]; 3] {
    let [ax, ay, az] = degrees.map(f64::to_radians);
    let (sx, cx) = ax.sin_cos();
    let (sy, cy) = ay.sin_cos();
    let (sz, cz) = az.sin_cos();
    let rx = [[1.0, 0.0, 0.0], [0.0, cx, -sx], [0.0, sx, cx]];
    let ry = [[cy, 0.0, sy], [0.0, 1.0, 0.0], [-sy, 0.0, cy]];
    let rz = [[cz, -sz, 0.0], [sz, cz, 0.0], [0.0, 0.0, 1.0]];
    mat_mul(&rz, &mat_mul(&ry, &rx))
}

fn mat_mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[r][k] * b[k][c]).sum();
        }
    }
    out
}

/// Multiply the transpose of `m` by `v`; the inverse for rotations.
pub fn transpose_mul(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (c, cell) in out.iter_mut().enumerate() {
        *cell = (0..3).map(|r| m[r][c] * v[r]).sum();
    }
    out
}

/// Normalized 1D Gaussian kernel truncated at three sigmas.
pub fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-(x * x) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| (w / total) as f32).collect()
}

/// Convolve every lane along `axis` with an odd-length kernel.
///
/// Samples beyond the edge repeat the edge voxel.
pub fn convolve_axis(volume: &Array3<f32>, axis: usize, kernel: &[f32]) -> Array3<f32> {
    let mut out = Array3::zeros(volume.dim());
    let n = volume.len_of(Axis(axis)) as isize;
    let radius = (kernel.len() / 2) as isize;

    Zip::from(volume.lanes(Axis(axis)))
        .and(out.lanes_mut(Axis(axis)))
        .for_each(|src, mut dst| {
            for i in 0..n {
                let mut acc = 0.0f32;
                for (t, w) in kernel.iter().enumerate() {
                    let idx = (i + t as isize - radius).clamp(0, n - 1);
                    acc += w * src[idx as usize];
                }
                dst[i as usize] = acc;
            }
        });
    out
}

/// Cyclically shift a volume along `axis` by `shift` voxels.
pub fn roll(volume: ArrayView3<'_, f32>, axis: usize, shift: usize) -> Array3<f32> {
    let n = volume.len_of(Axis(axis));
    let shift = shift % n;
    Array3::from_shape_fn(volume.dim(), |(i, j, k)| {
        let mut idx = [i, j, k];
        idx[axis] = (idx[axis] + n - shift) % n;
        volume[idx]
    })
}

/// Linear resampling of a 1D signal to `len` samples spanning the same extent.
pub fn resize_linear(signal: &[f32], len: usize) -> Vec<f32> {
    let n = signal.len();
    if n == 0 || len == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![signal[0]; len];
    }
    if len == 1 {
        return vec![signal[(n - 1) / 2]];
    }
    let scale = (n - 1) as f64 / (len - 1) as f64;
    (0..len)
        .map(|i| {
            let pos = i as f64 * scale;
            let lo = (pos.floor() as usize).min(n - 1);
            let hi = (lo + 1).min(n - 1);
            let frac = (pos - lo as f64) as f32;
            signal[lo] * (1.0 - frac) + signal[hi] * frac
        })
        .collect()
}
