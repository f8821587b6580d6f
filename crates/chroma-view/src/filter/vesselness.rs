//! Multi-scale Hessian vesselness (Frangi) for bright tubular structures.

use super::blur::{gaussian_kernel, separable};
use super::normalize::rescale_like;
use crate::media::Plane;

/// Upper bound on the number of scales evaluated per call.
pub const MAX_SCALES: usize = 64;

/// Scales `min, min + step, ...` strictly below `max`, at most [`MAX_SCALES`]
/// of them. An empty range or a non-positive step gives the single scale `min`.
pub fn scales(scale_min: f32, scale_max: f32, scale_step: f32) -> Vec<f32> {
    let lo = f64::from(scale_min.min(scale_max));
    let hi = f64::from(scale_min.max(scale_max));
    let step = f64::from(scale_step);
    if step.is_nan() || step <= 0.0 {
        return vec![lo as f32];
    }

    let count = ((hi - lo) / step).ceil();
    if !count.is_finite() || count < 1.0 {
        return vec![lo as f32];
    }
    if count > MAX_SCALES as f64 {
        log::warn!(
            "Scale range {lo}..{hi} step {step} gives {count} scales, keeping the first {MAX_SCALES}"
        );
    }
    let count = (count as usize).min(MAX_SCALES);
    (0..count).map(|k| (lo + k as f64 * step) as f32).collect()
}

/// Maximum vesselness response over all scales, rescaled to the input range.
///
/// `beta` controls blob suppression and `gamma` the structureness threshold.
/// `alpha` only applies to volumetric data and is accepted for config
/// compatibility.
pub fn frangi(plane: &Plane, sigmas: &[f32], beta: f32, gamma: f32) -> Plane {
    let mut best = vec![0.0f32; plane.len()];
    for &sigma in sigmas {
        if sigma.is_nan() || sigma <= 0.0 {
            continue;
        }
        let response = vesselness_at_scale(plane, sigma, beta, gamma);
        for (b, v) in best.iter_mut().zip(response) {
            *b = b.max(v);
        }
    }
    rescale_like(&Plane::new(plane.width, plane.height, best), plane)
}

fn vesselness_at_scale(plane: &Plane, sigma: f32, beta: f32, gamma: f32) -> Vec<f32> {
    let g0 = gaussian_kernel(sigma, 0);
    let g1 = gaussian_kernel(sigma, 1);
    let g2 = gaussian_kernel(sigma, 2);
    let norm = sigma * sigma;

    let hxx = separable(plane, &g2, &g0);
    let hyy = separable(plane, &g0, &g2);
    let hxy = separable(plane, &g1, &g1);

    let two_b2 = 2.0 * beta * beta;
    let two_c2 = 2.0 * gamma * gamma;

    (0..plane.len())
        .map(|i| {
            let (l1, l2) = eigenvalues(hxx.data[i] * norm, hxy.data[i] * norm, hyy.data[i] * norm);
            // Bright ridges have a strongly negative principal curvature.
            if l2 >= 0.0 {
                return 0.0;
            }
            let rb = l1 / l2;
            let s2 = l1 * l1 + l2 * l2;
            let blobness = if two_b2 > 0.0 { (-rb * rb / two_b2).exp() } else { 0.0 };
            let structure = if two_c2 > 0.0 { -(-s2 / two_c2).exp_m1() } else { 1.0 };
            blobness * structure
        })
        .collect()
}

/// Eigenvalues of `[[a, b], [b, c]]`, ordered so that `|l1| <= |l2|`.
fn eigenvalues(a: f32, b: f32, c: f32) -> (f32, f32) {
    let half_trace = 0.5 * (a + c);
    let disc = (0.25 * (a - c) * (a - c) + b * b).sqrt();
    let e1 = half_trace + disc;
    let e2 = half_trace - disc;
    if e1.abs() <= e2.abs() { (e1, e2) } else { (e2, e1) }
}
