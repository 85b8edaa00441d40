//! Spatial transforms: geometry and acquisition artifacts that move voxels.
//!
//! Resampling transforms fill voxels pulled from outside the volume with the
//! volume's minimum finite value.

use ndarray::{s, Array3, Axis, Zip};
use rand::Rng;
use rand_chacha::ChaCha20Rng;

use super::sampling::{
    center, finite_min, finite_range, resample, resize_linear, roll, rotation_matrix, symmetric,
    transpose_mul, trilinear, uniform, uniform_int,
};
use super::Args;

/// Spike amplitude at unit intensity, as a fraction of the intensity span.
const SPIKE_SCALE: f64 = 0.25;

type Outcome = Result<Array3<f32>, String>;

/// Mirror along one anatomical axis with probability `p`.
pub(crate) fn flip(mut volume: Array3<f32>, args: Args<'_>, rng: &mut ChaCha20Rng) -> Outcome {
    let axis = match args.choice("axes")? {
        "lr" => 0,
        "ap" => 1,
        "is" => 2,
        other => return Err(format!("unknown flip axis `{other}`")),
    };
    let p = args.scalar("p")?;

    if rng.gen::<f64>() < p {
        volume.invert_axis(Axis(axis));
        volume = volume.as_standard_layout().into_owned();
    }
    Ok(volume)
}

/// Random scaling, rotation and translation about the volume center.
pub(crate) fn affine(volume: Array3<f32>, args: Args<'_>, rng: &mut ChaCha20Rng) -> Outcome {
    let (scale_lo, scale_hi) = args.pair("scales")?;
    let degrees = args.scalar("degrees")?;
    let translation = args.scalar("translation")?;

    let scales = [(); 3].map(|_| uniform(rng, scale_lo, scale_hi));
    let angles = [(); 3].map(|_| symmetric(rng, degrees));
    let shift = [(); 3].map(|_| symmetric(rng, translation));

    if scales.iter().any(|s| *s <= 0.0) {
        return Err(format!("scale factors must be positive, got {scales:?}"));
    }

    let fill = finite_min(volume.view());
    Ok(resample(volume.view(), fill, rigid_map(volume.dim(), angles, shift, scales)))
}

/// Smooth random displacement field interpolated from a coarse control grid.
pub(crate) fn elastic(volume: Array3<f32>, args: Args<'_>, rng: &mut ChaCha20Rng) -> Outcome {
    let points = args.count("numControlPoints")?;
    let max_displacement = args.scalar("maxDisplacement")?;

    let (nx, ny, nz) = volume.dim();
    let dims = [nx, ny, nz];
    if points < 2 {
        return Err(format!("at least 2 control points are needed, got {points}"));
    }
    if let Some(axis) = (0..3).find(|&a| dims[a] < points) {
        return Err(format!(
            "axis {axis} has {} voxels, fewer than {points} control points",
            dims[axis]
        ));
    }

    // One coarse grid per displacement component; the outer ring stays fixed.
    let last = points - 1;
    let grid: [Array3<f32>; 3] = [(); 3].map(|_| {
        Array3::from_shape_fn((points, points, points), |(i, j, k)| {
            if [i, j, k].iter().any(|&g| g == 0 || g == last) {
                0.0
            } else {
                symmetric(rng, max_displacement) as f32
            }
        })
    });

    let to_grid = [0, 1, 2].map(|a| last as f64 / (dims[a] as f64 - 1.0).max(1.0));
    let fill = finite_min(volume.view());
    Ok(resample(volume.view(), fill, |o| {
        let g = [o[0] * to_grid[0], o[1] * to_grid[1], o[2] * to_grid[2]];
        [
            o[0] + trilinear(grid[0].view(), g, 0.0) as f64,
            o[1] + trilinear(grid[1].view(), g, 0.0) as f64,
            o[2] + trilinear(grid[2].view(), g, 0.0) as f64,
        ]
    }))
}

/// Downsample one axis by a random factor and linearly restore its size.
pub(crate) fn anisotropy(volume: Array3<f32>, args: Args<'_>, rng: &mut ChaCha20Rng) -> Outcome {
    let axis_key = args.choice("axes")?;
    let axis: usize = match axis_key.parse() {
        Ok(a) if a < 3 => a,
        _ => return Err(format!("unknown anisotropy axis `{axis_key}`")),
    };
    let downsampling = args.scalar("downsampling")?;
    let factor = uniform(rng, 1.0, downsampling.max(1.0));

    let n = volume.len_of(Axis(axis));
    if n < 2 {
        return Err(format!(
            "axis {axis} has {n} voxel; at least 2 are needed to downsample"
        ));
    }
    let reduced = ((n as f64 / factor).round() as usize).clamp(1, n);

    let mut out = Array3::zeros(volume.dim());
    Zip::from(volume.lanes(Axis(axis)))
        .and(out.lanes_mut(Axis(axis)))
        .for_each(|src, mut dst| {
            let lane = src.to_vec();
            let restored = resize_linear(&resize_linear(&lane, reduced), n);
            for (d, v) in dst.iter_mut().zip(restored) {
                *d = v;
            }
        });
    Ok(out)
}

/// Blend of rigidly displaced copies, as if the subject moved mid-scan.
pub(crate) fn motion(volume: Array3<f32>, args: Args<'_>, rng: &mut ChaCha20Rng) -> Outcome {
    let degrees = args.scalar("degrees")?;
    let translation = args.scalar("translation")?;
    let moves = args.count("numTransforms")?.max(1);

    let mut times: Vec<f64> = (0..moves).map(|_| uniform(rng, 0.0, 1.0)).collect();
    times.sort_by(f64::total_cmp);
    let poses: Vec<([f64; 3], [f64; 3])> = (0..moves)
        .map(|_| {
            let angles = [(); 3].map(|_| symmetric(rng, degrees));
            let shift = [(); 3].map(|_| symmetric(rng, translation));
            (angles, shift)
        })
        .collect();

    // The scan starts at rest and switches pose at each time point.
    let fill = finite_min(volume.view());
    let mut out = volume.mapv(|v| v * times[0] as f32);
    for (i, (angles, shift)) in poses.into_iter().enumerate() {
        let end = times.get(i + 1).copied().unwrap_or(1.0);
        let weight = (end - times[i]) as f32;
        if weight <= 0.0 {
            continue;
        }
        let moved = resample(
            volume.view(),
            fill,
            rigid_map(volume.dim(), angles, shift, [1.0; 3]),
        );
        out.scaled_add(weight, &moved);
    }
    Ok(out)
}

/// Faint periodic copies along a random axis.
pub(crate) fn ghosting(volume: Array3<f32>, args: Args<'_>, rng: &mut ChaCha20Rng) -> Outcome {
    let max_ghosts = args.count("numGhosts")?;
    let intensity = args.scalar("intensity")?;

    let axis = uniform_int(rng, 0, 2);
    let ghosts = uniform_int(rng, 1, max_ghosts.max(1));
    let strength = uniform(rng, 0.0, intensity.max(0.0)) as f32;

    let n = volume.len_of(Axis(axis));
    let mut out = volume.clone();
    let per_ghost = strength / ghosts as f32;
    for g in 1..=ghosts {
        let offset = g * n / (ghosts + 1);
        if offset == 0 {
            continue;
        }
        out.scaled_add(per_ghost, &roll(volume.view(), axis, offset));
    }
    Ok(out)
}

/// Superimposed plane-wave stripes, the image-space trace of k-space spikes.
pub(crate) fn spike(mut volume: Array3<f32>, args: Args<'_>, rng: &mut ChaCha20Rng) -> Outcome {
    let spikes = args.count("numSpikes")?;
    let intensity = args.scalar("intensity")?;

    let span = finite_range(volume.view())
        .map(|(lo, hi)| (hi - lo) as f64)
        .unwrap_or(0.0);

    let waves: Vec<([f64; 3], f64, f64)> = (0..spikes)
        .map(|_| {
            let freq = [(); 3].map(|_| uniform(rng, -0.5, 0.5));
            let phase = uniform(rng, 0.0, std::f64::consts::TAU);
            let amplitude = symmetric(rng, intensity) * span * SPIKE_SCALE;
            (freq, phase, amplitude)
        })
        .collect();

    for ((i, j, k), v) in volume.indexed_iter_mut() {
        let pos = [i as f64, j as f64, k as f64];
        let stripes: f64 = waves
            .iter()
            .map(|(freq, phase, amplitude)| {
                let arg = std::f64::consts::TAU
                    * (freq[0] * pos[0] + freq[1] * pos[1] + freq[2] * pos[2])
                    + phase;
                amplitude * arg.cos()
            })
            .sum();
        *v += stripes as f32;
    }
    Ok(volume)
}

/// Exchange randomly placed cubic patches.
pub(crate) fn swap(mut volume: Array3<f32>, args: Args<'_>, rng: &mut ChaCha20Rng) -> Outcome {
    let patch = args.count("patchSize")?;
    let iterations = args.count("numIterations")?;

    let (nx, ny, nz) = volume.dim();
    let dims = [nx, ny, nz];
    if patch == 0 {
        return Err("patch size must be positive".to_string());
    }
    if let Some(axis) = (0..3).find(|&a| dims[a] < patch) {
        return Err(format!(
            "patch size {patch} exceeds axis {axis} extent {}",
            dims[axis]
        ));
    }

    for _ in 0..iterations {
        let a = [0, 1, 2].map(|axis| uniform_int(rng, 0, dims[axis] - patch));
        let b = [0, 1, 2].map(|axis| uniform_int(rng, 0, dims[axis] - patch));

        let patch_a = volume
            .slice(s![a[0]..a[0] + patch, a[1]..a[1] + patch, a[2]..a[2] + patch])
            .to_owned();
        let patch_b = volume
            .slice(s![b[0]..b[0] + patch, b[1]..b[1] + patch, b[2]..b[2] + patch])
            .to_owned();
        volume
            .slice_mut(s![a[0]..a[0] + patch, a[1]..a[1] + patch, a[2]..a[2] + patch])
            .assign(&patch_b);
        volume
            .slice_mut(s![b[0]..b[0] + patch, b[1]..b[1] + patch, b[2]..b[2] + patch])
            .assign(&patch_a);
    }
    Ok(volume)
}

/// Pull-back map for scale, rotation and translation about the center.
fn rigid_map(
    dim: (usize, usize, usize),
    angles: [f64; 3],
    shift: [f64; 3],
    scales: [f64; 3],
) -> impl Fn([f64; 3]) -> [f64; 3] {
    let rotation = rotation_matrix(angles);
    let c = center(dim);
    move |o| {
        let d = [
            (o[0] - c[0] - shift[0]) / scales[0],
            (o[1] - c[1] - shift[1]) / scales[1],
            (o[2] - c[2] - shift[2]) / scales[2],
        ];
        let p = transpose_mul(&rotation, d);
        [c[0] + p[0], c[1] + p[1], c[2] + p[2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParamSet, ParamValue};
    use rand::SeedableRng;

    fn ramp() -> Array3<f32> {
        Array3::from_shape_fn((12, 10, 8), |(i, j, k)| (i * 100 + j * 10 + k) as f32)
    }

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(42)
    }

    #[test]
    fn test_flip_always_and_never() {
        let mut params = ParamSet::new();
        params.insert("axes", ParamValue::Choice("lr".into()));
        params.insert("p", ParamValue::Scalar(1.0));
        let flipped = flip(ramp(), Args::new(&params), &mut rng()).unwrap();
        assert_eq!(flipped[[0, 0, 0]], ramp()[[11, 0, 0]]);

        params.insert("p", ParamValue::Scalar(0.0));
        let kept = flip(ramp(), Args::new(&params), &mut rng()).unwrap();
        assert_eq!(kept, ramp());
    }

    #[test]
    fn test_flip_rejects_unknown_axis() {
        let mut params = ParamSet::new();
        params.insert("axes", ParamValue::Choice("xy".into()));
        params.insert("p", ParamValue::Scalar(1.0));
        assert!(flip(ramp(), Args::new(&params), &mut rng()).is_err());
    }

    #[test]
    fn test_affine_identity_parameters() {
        let mut params = ParamSet::new();
        params.insert("scales", ParamValue::Pair(1.0, 1.0));
        params.insert("degrees", ParamValue::Scalar(0.0));
        params.insert("translation", ParamValue::Scalar(0.0));
        let out = affine(ramp(), Args::new(&params), &mut rng()).unwrap();
        for (a, b) in out.iter().zip(ramp().iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_affine_rejects_non_positive_scale() {
        let mut params = ParamSet::new();
        params.insert("scales", ParamValue::Pair(0.0, 0.0));
        params.insert("degrees", ParamValue::Scalar(0.0));
        params.insert("translation", ParamValue::Scalar(0.0));
        assert!(affine(ramp(), Args::new(&params), &mut rng()).is_err());
    }

    #[test]
    fn test_elastic_needs_enough_voxels() {
        let mut params = ParamSet::new();
        params.insert("numControlPoints", ParamValue::Scalar(9.0));
        params.insert("maxDisplacement", ParamValue::Scalar(2.0));
        let err = elastic(ramp(), Args::new(&params), &mut rng()).unwrap_err();
        assert!(err.contains("control points"));

        params.insert("numControlPoints", ParamValue::Scalar(5.0));
        let out = elastic(ramp(), Args::new(&params), &mut rng()).unwrap();
        assert_eq!(out.dim(), (12, 10, 8));
    }

    #[test]
    fn test_anisotropy_keeps_shape_and_constant() {
        let mut params = ParamSet::new();
        params.insert("axes", ParamValue::Choice("2".into()));
        params.insert("downsampling", ParamValue::Scalar(4.0));
        let flat = Array3::from_elem((5, 5, 9), 7.0f32);
        let out = anisotropy(flat, Args::new(&params), &mut rng()).unwrap();
        assert_eq!(out.dim(), (5, 5, 9));
        assert!(out.iter().all(|v| (v - 7.0).abs() < 1e-5));
    }

    #[test]
    fn test_anisotropy_rejects_single_voxel_axis() {
        let mut params = ParamSet::new();
        params.insert("axes", ParamValue::Choice("1".into()));
        params.insert("downsampling", ParamValue::Scalar(2.0));
        let thin = Array3::from_elem((4, 1, 4), 1.0f32);
        assert!(anisotropy(thin, Args::new(&params), &mut rng()).is_err());
    }

    #[test]
    fn test_motion_without_movement_is_identity() {
        let mut params = ParamSet::new();
        params.insert("degrees", ParamValue::Scalar(0.0));
        params.insert("translation", ParamValue::Scalar(0.0));
        params.insert("numTransforms", ParamValue::Scalar(3.0));
        let out = motion(ramp(), Args::new(&params), &mut rng()).unwrap();
        for (a, b) in out.iter().zip(ramp().iter()) {
            assert!((a - b).abs() < 1e-2);
        }
    }

    #[test]
    fn test_ghosting_zero_intensity_is_identity() {
        let mut params = ParamSet::new();
        params.insert("numGhosts", ParamValue::Scalar(4.0));
        params.insert("intensity", ParamValue::Scalar(0.0));
        let out = ghosting(ramp(), Args::new(&params), &mut rng()).unwrap();
        assert_eq!(out, ramp());
    }

    #[test]
    fn test_spike_changes_volume() {
        let mut params = ParamSet::new();
        params.insert("numSpikes", ParamValue::Scalar(2.0));
        params.insert("intensity", ParamValue::Scalar(2.0));
        let out = spike(ramp(), Args::new(&params), &mut rng()).unwrap();
        assert_ne!(out, ramp());
    }

    #[test]
    fn test_swap_is_seeded() {
        let mut params = ParamSet::new();
        params.insert("patchSize", ParamValue::Scalar(3.0));
        params.insert("numIterations", ParamValue::Scalar(10.0));
        let first = swap(ramp(), Args::new(&params), &mut rng()).unwrap();
        let second = swap(ramp(), Args::new(&params), &mut rng()).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, ramp());
    }

    #[test]
    fn test_swap_patch_larger_than_volume() {
        let mut params = ParamSet::new();
        params.insert("patchSize", ParamValue::Scalar(15.0));
        params.insert("numIterations", ParamValue::Scalar(1.0));
        let err = swap(ramp(), Args::new(&params), &mut rng()).unwrap_err();
        assert!(err.contains("patch size 15"));
    }
}
