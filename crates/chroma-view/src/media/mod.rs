pub mod decoder;
pub mod types;

use thiserror::Error;

pub use decoder::load_image;
pub use types::{Image, Plane};

/// Failure modes of the image load service.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("malformed array container: {0}")]
    Container(#[from] serde_json::Error),
    #[error("unsupported file format: {0:?}")]
    UnsupportedFormat(String),
    #[error("ambiguous array keys: {0:?}")]
    AmbiguousKey(Vec<String>),
    #[error("no array key contains {0:?}")]
    NoMatchingKey(&'static str),
    #[error("invalid array: {0}")]
    InvalidArray(String),
}
