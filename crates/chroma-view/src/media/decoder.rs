use std::path::Path;

use image::{DynamicImage, ImageFormat};
use serde::Deserialize;
use serde_json::Value;

use super::LoadError;
use super::types::Image;

/// Substring identifying the reconstruction array inside a multi-array container.
pub const RECONSTRUCTION_KEY: &str = "rec";

/// A single array as stored in a JSON container: row-major data plus its shape.
#[derive(Debug, Deserialize)]
struct RawArray {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Load an image file as an (H, W, C) float array.
///
/// Raster formats go through the `image` crate. A `.json` file is treated as a
/// multi-array container. Grayscale input always gets a trailing channel axis.
pub fn load_image(path: &Path) -> Result<Image, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let image = if ext == "json" {
        load_container(path)?
    } else {
        load_raster(path)?
    };

    log::info!(
        "Loaded image {}: {}x{}, {} channel(s)",
        path.display(),
        image.width,
        image.height,
        image.channels
    );
    Ok(image)
}

fn load_raster(path: &Path) -> Result<Image, LoadError> {
    let format = ImageFormat::from_path(path).map_err(|_| {
        LoadError::UnsupportedFormat(
            path.extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
    })?;
    let bytes = std::fs::read(path)?;
    let decoded = image::load_from_memory_with_format(&bytes, format)?;
    Ok(from_dynamic(&decoded))
}

/// Convert a decoded raster to float channels. Grayscale stays single-channel,
/// alpha is kept as its own channel when present.
pub fn from_dynamic(img: &DynamicImage) -> Image {
    let (width, height) = (img.width(), img.height());
    let color = img.color();
    match (color.has_color(), color.has_alpha()) {
        (false, false) => Image::new(width, height, 1, img.to_luma32f().into_raw()),
        (false, true) => Image::new(width, height, 2, img.to_luma_alpha32f().into_raw()),
        (true, false) => Image::new(width, height, 3, img.to_rgb32f().into_raw()),
        (true, true) => Image::new(width, height, 4, img.to_rgba32f().into_raw()),
    }
}

fn load_container(path: &Path) -> Result<Image, LoadError> {
    let text = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)?;
    parse_container(value)
}

/// Pick the array out of a container document.
///
/// The document is either a bare `{shape, data}` array or a mapping of names to
/// arrays, in which case exactly one name must contain [`RECONSTRUCTION_KEY`].
pub fn parse_container(value: Value) -> Result<Image, LoadError> {
    let Value::Object(mut map) = value else {
        return Err(LoadError::InvalidArray(
            "container must be a JSON object".into(),
        ));
    };

    if map.contains_key("shape") && map.contains_key("data") {
        let raw: RawArray = serde_json::from_value(Value::Object(map))?;
        return array_to_image(raw);
    }

    let keys: Vec<String> = map
        .keys()
        .filter(|k| k.contains(RECONSTRUCTION_KEY))
        .cloned()
        .collect();
    let key = match keys.as_slice() {
        [] => return Err(LoadError::NoMatchingKey(RECONSTRUCTION_KEY)),
        [only] => only.clone(),
        _ => return Err(LoadError::AmbiguousKey(keys)),
    };
    let Some(entry) = map.remove(&key) else {
        return Err(LoadError::NoMatchingKey(RECONSTRUCTION_KEY));
    };
    log::debug!("Selected container array '{key}'");
    let raw: RawArray = serde_json::from_value(entry)?;
    array_to_image(raw)
}

fn array_to_image(raw: RawArray) -> Result<Image, LoadError> {
    let (h, w, c) = match raw.shape.as_slice() {
        [h, w] => (*h, *w, 1),
        [h, w, c] => (*h, *w, *c),
        other => {
            return Err(LoadError::InvalidArray(format!(
                "expected 2 or 3 dimensions, got shape {other:?}"
            )));
        }
    };
    if h == 0 || w == 0 || c == 0 {
        return Err(LoadError::InvalidArray(format!(
            "empty shape {:?}",
            raw.shape
        )));
    }
    let expected_len = h
        .checked_mul(w)
        .and_then(|v| v.checked_mul(c))
        .ok_or_else(|| LoadError::InvalidArray(format!("shape {:?} overflows", raw.shape)))?;
    if expected_len != raw.data.len() {
        return Err(LoadError::InvalidArray(format!(
            "shape {:?} needs {} values, found {}",
            raw.shape,
            expected_len,
            raw.data.len()
        )));
    }
    let width = u32::try_from(w).map_err(|_| LoadError::InvalidArray("width overflow".into()))?;
    let height =
        u32::try_from(h).map_err(|_| LoadError::InvalidArray("height overflow".into()))?;
    Ok(Image::new(width, height, c, raw.data))
}
