use super::normalize::rescale_like;
use crate::media::Plane;

/// Perona-Malik anisotropic diffusion with exponential conduction
/// `exp(-(d / sensitivity)^2)`.
///
/// `step_size` above 0.25 is unstable. Runs exactly `n_iter` iterations; configs
/// written for the earlier viewer, which ran `n_iter - 1`, differ by one step.
/// The output is rescaled onto the input's value range.
pub fn anisotropic_diffusion(plane: &Plane, step_size: f32, sensitivity: f32, n_iter: u32) -> Plane {
    if n_iter == 0 || sensitivity.is_nan() || sensitivity <= 0.0 {
        return plane.clone();
    }
    let w = plane.width as usize;
    let h = plane.height as usize;
    let mut img = plane.data.clone();

    let mut flux_s = vec![0.0f32; w * h];
    let mut flux_e = vec![0.0f32; w * h];

    for _ in 0..n_iter {
        // Forward differences weighted by conduction; last row/column stay zero.
        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                flux_s[i] = if y + 1 < h {
                    conduct(img[i + w] - img[i], sensitivity)
                } else {
                    0.0
                };
                flux_e[i] = if x + 1 < w {
                    conduct(img[i + 1] - img[i], sensitivity)
                } else {
                    0.0
                };
            }
        }
        // Divergence: subtract the flux entering from the north/west neighbor.
        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let mut ns = flux_s[i];
                if y > 0 {
                    ns -= flux_s[i - w];
                }
                let mut ew = flux_e[i];
                if x > 0 {
                    ew -= flux_e[i - 1];
                }
                img[i] += step_size * (ns + ew);
            }
        }
    }

    rescale_like(&Plane::new(plane.width, plane.height, img), plane)
}

#[inline]
fn conduct(delta: f32, kappa: f32) -> f32 {
    let r = delta / kappa;
    (-r * r).exp() * delta
}
