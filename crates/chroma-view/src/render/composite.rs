use image::{Rgba, RgbaImage};

use super::colormap::ColorLayer;

/// Additive blend of colorized layers in linear `[0, 1]` space, clipped at 1
/// and quantized to opaque 8-bit RGBA. No layers yields a black frame.
pub fn composite(layers: &[&ColorLayer], width: u32, height: u32) -> RgbaImage {
    let mut sum = vec![0.0f32; width as usize * height as usize * 3];
    for layer in layers {
        if layer.width != width || layer.height != height {
            log::warn!(
                "Skipping layer of size {}x{} in {}x{} composite",
                layer.width,
                layer.height,
                width,
                height
            );
            continue;
        }
        for (acc, v) in sum.iter_mut().zip(&layer.data) {
            *acc += v;
        }
    }

    let mut out = RgbaImage::new(width, height);
    for (px, rgb) in out.pixels_mut().zip(sum.chunks_exact(3)) {
        *px = Rgba([to_u8(rgb[0]), to_u8(rgb[1]), to_u8(rgb[2]), 255]);
    }
    out
}

#[inline]
fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
