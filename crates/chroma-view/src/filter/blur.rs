//! Separable Gaussian filtering on single-channel planes.
//!
//! Boundaries are handled by half-sample reflection (`d c b a | a b c d | d c b a`),
//! and the kernel radius is `round(4 * sigma)`.

use crate::media::Plane;

/// Truncation of the kernel in units of sigma.
const TRUNCATE: f32 = 4.0;

/// Sampled Gaussian kernel (or one of its first two derivatives), indexed
/// from `-radius` to `radius`.
///
/// Order 0 weights sum to one. Derivative kernels share the same
/// normalization so their responses are comparable across orders.
pub fn gaussian_kernel(sigma: f32, order: u8) -> Vec<f32> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return vec![if order == 0 { 1.0 } else { 0.0 }];
    }
    let radius = (TRUNCATE * sigma).round().max(1.0) as i32;
    let s2 = sigma * sigma;
    let base: Vec<f32> = (-radius..=radius)
        .map(|i| {
            let x = i as f32;
            (-x * x / (2.0 * s2)).exp()
        })
        .collect();
    let sum: f32 = base.iter().sum();

    (-radius..=radius)
        .zip(&base)
        .map(|(i, &g)| {
            let x = i as f32;
            let g = g / sum;
            match order {
                0 => g,
                1 => -x / s2 * g,
                _ => (x * x / (s2 * s2) - 1.0 / s2) * g,
            }
        })
        .collect()
}

/// Map an out-of-range index back into `0..n` by mirroring.
#[inline]
fn reflect(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Correlate the plane with `row_kernel` along x, then `col_kernel` along y.
pub fn separable(plane: &Plane, row_kernel: &[f32], col_kernel: &[f32]) -> Plane {
    let w = plane.width as usize;
    let h = plane.height as usize;
    if w == 0 || h == 0 {
        return plane.clone();
    }

    let mut tmp = vec![0.0f32; w * h];
    horizontal_pass(&plane.data, &mut tmp, w, h, row_kernel);
    let mut out = vec![0.0f32; w * h];
    vertical_pass(&tmp, &mut out, w, h, col_kernel);
    Plane::new(plane.width, plane.height, out)
}

fn horizontal_pass(src: &[f32], dst: &mut [f32], w: usize, h: usize, k: &[f32]) {
    let radius = (k.len() / 2) as isize;
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kw) in k.iter().enumerate() {
                let sx = reflect(x as isize + ki as isize - radius, w);
                acc += kw * row[sx];
            }
            dst[y * w + x] = acc;
        }
    }
}

fn vertical_pass(src: &[f32], dst: &mut [f32], w: usize, h: usize, k: &[f32]) {
    let radius = (k.len() / 2) as isize;
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kw) in k.iter().enumerate() {
                let sy = reflect(y as isize + ki as isize - radius, h);
                acc += kw * src[sy * w + x];
            }
            dst[y * w + x] = acc;
        }
    }
}

/// Plain Gaussian smoothing. Non-positive sigma returns the plane unchanged.
#[must_use = "returns the blurred plane"]
pub fn gaussian_filter(plane: &Plane, sigma: f32) -> Plane {
    if !sigma.is_finite() || sigma <= 0.0 {
        return plane.clone();
    }
    let k = gaussian_kernel(sigma, 0);
    separable(plane, &k, &k)
}

/// Gaussian blur followed by a rescale back onto the input's value range.
pub fn gaussian_blur(plane: &Plane, sigma: f32) -> Plane {
    let (lo, hi) = plane.min_max();
    gaussian_filter(plane, sigma).rescale_to(lo, hi)
}

/// `x + (x - blur(x)) * strength`, clipped to `[0, 1]`.
pub fn unsharp_mask(plane: &Plane, strength: f32, sigma: f32) -> Plane {
    let blurred = gaussian_filter(plane, sigma);
    let data = plane
        .data
        .iter()
        .zip(&blurred.data)
        .map(|(&x, &b)| (x + (x - b) * strength).clamp(0.0, 1.0))
        .collect();
    Plane::new(plane.width, plane.height, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn kernel_sums_to_one() {
        let k = gaussian_kernel(2.0, 0);
        assert_eq!(k.len(), 17);
        let sum: f32 = k.iter().sum();
        assert!(approx_eq(sum, 1.0, 1e-5));
    }

    #[test]
    fn derivative_kernels_are_balanced() {
        let k1 = gaussian_kernel(1.5, 1);
        let sum: f32 = k1.iter().sum();
        assert!(approx_eq(sum, 0.0, 1e-5));
        // Odd symmetry.
        assert!(approx_eq(k1[0], -k1[k1.len() - 1], 1e-7));
        let k2 = gaussian_kernel(1.5, 2);
        assert!(k2[k2.len() / 2] < 0.0);
    }

    #[test]
    fn reflect_mirrors_edges() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(2, 4), 2);
    }

    #[test]
    fn zero_sigma_is_identity() {
        let p = Plane::from_fn(5, 5, |x, y| (x * y) as f32);
        assert_eq!(gaussian_filter(&p, 0.0), p);
        assert_eq!(gaussian_filter(&p, -1.0), p);
    }

    #[test]
    fn constant_plane_is_unchanged() {
        let p = Plane::filled(6, 4, 0.25);
        let out = gaussian_filter(&p, 1.5);
        assert!(out.data.iter().all(|&v| approx_eq(v, 0.25, 1e-6)));
    }

    #[test]
    fn blur_spreads_energy_from_single_pixel() {
        let mut p = Plane::filled(9, 9, 0.0);
        p.data[4 * 9 + 4] = 1.0;
        let out = gaussian_filter(&p, 1.0);
        let nonzero = out.data.iter().filter(|&&v| v > 1e-4).count();
        assert!(nonzero > 1);
        let sum: f32 = out.data.iter().sum();
        assert!(approx_eq(sum, 1.0, 1e-3));
        assert!(out.get(4, 4) < 1.0);
    }

    #[test]
    fn gaussian_blur_keeps_input_range() {
        let p = Plane::from_fn(8, 8, |x, _| if x < 4 { 0.2 } else { 0.9 });
        let out = gaussian_blur(&p, 1.0);
        let (lo, hi) = out.min_max();
        assert!(approx_eq(lo, 0.2, 1e-5));
        assert!(approx_eq(hi, 0.9, 1e-5));
    }

    #[test]
    fn unsharp_mask_sharpens_edge_within_unit_range() {
        let p = Plane::from_fn(10, 1, |x, _| if x < 5 { 0.3 } else { 0.7 });
        let out = unsharp_mask(&p, 1.0, 1.0);
        assert!(out.get(4, 0) < 0.3);
        assert!(out.get(5, 0) > 0.7);
        assert!(out.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}
