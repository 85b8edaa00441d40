//! Intensity transforms: voxel values change, positions do not.

use ndarray::Array3;
use rand_chacha::ChaCha20Rng;

use super::sampling::{convolve_axis, gaussian_kernel, standard_normal, symmetric, uniform};
use super::Args;

/// Blur sigmas below this are treated as no blur on that axis.
const MIN_SIGMA: f64 = 1e-3;

type Outcome = Result<Array3<f32>, String>;

/// Additive Gaussian noise with a random mean and standard deviation.
pub(crate) fn noise(mut volume: Array3<f32>, args: Args<'_>, rng: &mut ChaCha20Rng) -> Outcome {
    let mean = symmetric(rng, args.scalar("mean")?);
    let std = uniform(rng, 0.0, args.scalar("std")?.max(0.0));

    for v in volume.iter_mut() {
        *v += (mean + std * standard_normal(rng)) as f32;
    }
    Ok(volume)
}

/// Sign-preserving power law with exponent `exp(U(log_gamma))`.
pub(crate) fn gamma(mut volume: Array3<f32>, args: Args<'_>, rng: &mut ChaCha20Rng) -> Outcome {
    let (lo, hi) = args.pair("logGamma")?;
    let gamma = uniform(rng, lo, hi).exp() as f32;

    volume.mapv_inplace(|v| v.signum() * v.abs().powf(gamma));
    Ok(volume)
}

/// Smooth multiplicative field, the exponential of a random polynomial.
pub(crate) fn bias(mut volume: Array3<f32>, args: Args<'_>, rng: &mut ChaCha20Rng) -> Outcome {
    let magnitude = args.scalar("coefficients")?;
    let order = args.count("order")?;

    let mut terms: Vec<([usize; 3], f64)> = Vec::new();
    for x in 0..=order {
        for y in 0..=order - x {
            for z in 0..=order - x - y {
                terms.push(([x, y, z], symmetric(rng, magnitude)));
            }
        }
    }

    // Per-axis powers of coordinates normalized to [-1, 1].
    let (nx, ny, nz) = volume.dim();
    let powers = [nx, ny, nz].map(|n| {
        (0..n)
            .map(|i| {
                let t = if n > 1 {
                    2.0 * i as f64 / (n - 1) as f64 - 1.0
                } else {
                    0.0
                };
                (0..=order).map(|p| t.powi(p as i32)).collect::<Vec<f64>>()
            })
            .collect::<Vec<_>>()
    });

    for ((i, j, k), v) in volume.indexed_iter_mut() {
        let log_field: f64 = terms
            .iter()
            .map(|([px, py, pz], c)| c * powers[0][i][*px] * powers[1][j][*py] * powers[2][k][*pz])
            .sum();
        *v *= log_field.exp() as f32;
    }
    Ok(volume)
}

/// Separable Gaussian blur with an independent sigma per axis.
pub(crate) fn blur(volume: Array3<f32>, args: Args<'_>, rng: &mut ChaCha20Rng) -> Outcome {
    let (lo, hi) = args.pair("std")?;
    let sigmas = [(); 3].map(|_| uniform(rng, lo.max(0.0), hi.max(0.0)));

    let mut out = volume;
    for (axis, sigma) in sigmas.into_iter().enumerate() {
        if sigma < MIN_SIGMA {
            continue;
        }
        out = convolve_axis(&out, axis, &gaussian_kernel(sigma));
    }
    Ok(out)
}
