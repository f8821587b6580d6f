//! Transfer-function visualization: a 2D histogram of (input, output) pixel
//! pairs drawn over a checkerboard.

use image::RgbaImage;

use super::colormap::checkerboard;
use crate::media::Plane;

/// Bins per axis; the response image is square with one pixel per bin.
pub const RESPONSE_SIZE: u32 = 128;

fn bin(v: f32) -> usize {
    let n = RESPONSE_SIZE as usize;
    if !v.is_finite() {
        return 0;
    }
    ((v.clamp(0.0, 1.0) * n as f32) as usize).min(n - 1)
}

/// Placeholder shown for hidden channels.
pub fn placeholder() -> RgbaImage {
    checkerboard(RESPONSE_SIZE, RESPONSE_SIZE)
}

/// Render the response of a channel. `input` is the normalized raw channel,
/// `output` the pipeline result. Column is the input level, row 0 the
/// output level 1.0. Bin density is log-scaled and drives opacity; the pixel
/// color is the channel colormap at that output level.
pub fn response_image(input: &Plane, output: &Plane, rgb: [f32; 3]) -> RgbaImage {
    let n = RESPONSE_SIZE as usize;
    let mut counts = vec![0u32; n * n];
    for (&i, &o) in input.data.iter().zip(&output.data) {
        let col = bin(i);
        let row = n - 1 - bin(o);
        counts[row * n + col] += 1;
    }

    let mut img = placeholder();
    let max = counts.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return img;
    }
    let norm = (1.0 + max as f32).ln();

    for (idx, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let alpha = (1.0 + count as f32).ln() / norm;
        let row = idx / n;
        let level = (n - 1 - row) as f32 / (n - 1) as f32;
        let px = img.get_pixel_mut((idx % n) as u32, row as u32);
        for c in 0..3 {
            let fg = rgb[c] * level * 255.0;
            let bg = f32::from(px[c]);
            px[c] = (bg + (fg - bg) * alpha).round().clamp(0.0, 255.0) as u8;
        }
    }
    img
}
