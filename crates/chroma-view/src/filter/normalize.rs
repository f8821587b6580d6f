//! Intensity normalization kernels: local contrast, sigmoid, gamma, min-max.

use super::blur::gaussian_filter;
use crate::media::Plane;

const EPS: f64 = 1e-8;

/// Rescale `out` onto the value range of `reference`.
pub(crate) fn rescale_like(out: &Plane, reference: &Plane) -> Plane {
    let (lo, hi) = reference.min_max();
    out.rescale_to(lo, hi)
}

/// Divide by a blurred copy of the image (floored at a fraction of its peak),
/// then average the rescaled original with the rescaled result.
pub fn local_norm(plane: &Plane, kernel_size: f32, cutoff_percentile: f32) -> Plane {
    let blurred = gaussian_filter(plane, kernel_size / 3.0);
    let (_, peak) = blurred.min_max();
    let cutoff = peak * (cutoff_percentile / 100.0).powi(3);

    let divided: Vec<f32> = plane
        .data
        .iter()
        .zip(&blurred.data)
        .map(|(&x, &b)| {
            let v = x / b.max(cutoff);
            if v.is_finite() { v } else { 0.0 }
        })
        .collect();
    let divided = Plane::new(plane.width, plane.height, divided).normalized();
    let original = plane.normalized();

    let data = original
        .data
        .iter()
        .zip(&divided.data)
        .map(|(&a, &b)| 0.5 * (a + b))
        .collect();
    Plane::new(plane.width, plane.height, data)
}

/// Sigmoid contrast curve.
///
/// All four parameters are percentages of the unit interval. Input values at
/// `lower` and `upper` are sent to the logits of `new_lower` and `new_upper`
/// before the sigmoid; the result is min-max rescaled to `[0, 1]`.
pub fn sigmoid_norm(plane: &Plane, lower: f64, upper: f64, new_lower: f64, new_upper: f64) -> Plane {
    let low = lower / 100.0;
    let high = upper / 100.0;
    let nl = new_lower / 100.0;
    let nu = new_upper / 100.0;

    let logit_low = (EPS + nl / (1.0 - nl)).ln();
    let logit_high = (nu / (1.0 - nu + EPS)).ln();
    let slope = (logit_high - logit_low) / (high - low + EPS);

    plane
        .map(|x| {
            let a = slope * (f64::from(x) - low) + logit_low;
            (1.0 / (1.0 + (-a).exp())) as f32
        })
        .normalized()
}

/// `x^gamma`, rescaled back to the input range unless the input already spans
/// exactly `[0, 1]`.
pub fn gamma_correction(plane: &Plane, gamma: f32) -> Plane {
    let (lo, hi) = plane.min_max();
    let out = plane.map(|x| x.max(0.0).powf(gamma));
    if lo == 0.0 && hi == 1.0 {
        out
    } else {
        out.rescale_to(lo, hi)
    }
}

/// Clip to `[in_min, in_max]` and map affinely onto `[out_min, out_max]`.
pub fn minmax_norm(plane: &Plane, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> Plane {
    let (a, b) = if in_min <= in_max { (in_min, in_max) } else { (in_max, in_min) };
    let range = b - a;
    if range <= 0.0 {
        return Plane::filled(plane.width, plane.height, out_min);
    }
    let scale = (out_max - out_min) / range;
    plane.map(|x| out_min + (x.clamp(a, b) - a) * scale)
}
