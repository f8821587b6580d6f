use image::{Rgba, RgbaImage};

use super::RenderError;
use crate::media::Plane;

/// Ten-color categorical palette used by autocolor.
pub const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

pub const DEFAULT_COLOR: &str = "#ffffff";

/// Checkerboard cell edge in pixels.
pub const CHECKER_CELL: u32 = 8;
const CHECKER_LIGHT: u8 = 204;
const CHECKER_DARK: u8 = 153;

/// Parse `#rrggbb` (leading `#` optional) into linear `[0, 1]` RGB.
pub fn parse_hex(color: &str) -> Result<[f32; 3], RenderError> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(RenderError::InvalidColor(color.to_string()));
    }
    let mut rgb = [0.0f32; 3];
    for (i, c) in rgb.iter_mut().enumerate() {
        let byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| RenderError::InvalidColor(color.to_string()))?;
        *c = f32::from(byte) / 255.0;
    }
    Ok(rgb)
}

/// A channel mapped through its `black -> color` colormap, RGB interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorLayer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

/// Colorize a `[0, 1]` plane. Values outside the unit range are clamped.
pub fn colorize(plane: &Plane, rgb: [f32; 3]) -> ColorLayer {
    let mut data = Vec::with_capacity(plane.len() * 3);
    for &v in &plane.data {
        let t = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        data.extend_from_slice(&[rgb[0] * t, rgb[1] * t, rgb[2] * t]);
    }
    ColorLayer {
        width: plane.width,
        height: plane.height,
        data,
    }
}

/// Gray checkerboard used as the "transparent" background.
pub fn checkerboard(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let v = if (x / CHECKER_CELL + y / CHECKER_CELL) % 2 == 0 {
            CHECKER_LIGHT
        } else {
            CHECKER_DARK
        };
        Rgba([v, v, v, 255])
    })
}
