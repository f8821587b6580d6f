pub mod backend;
pub mod cache;
pub mod colormap;
pub mod composite;
pub mod response;
pub mod worker;

use std::sync::Arc;

use image::RgbaImage;
use thiserror::Error;

use crate::media::Image;
use crate::model::channel::ChannelProperty;
use backend::Backend;
use cache::ChannelCache;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("no image loaded")]
    NoImage,
    #[error("channel {index} out of range for image with {channels} channel(s)")]
    ChannelOutOfRange { index: usize, channels: usize },
    #[error("invalid color '{0}'")]
    InvalidColor(String),
    #[error("render panicked: {0}")]
    Panicked(String),
}

/// One finished frame.
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub composited: RgbaImage,
    /// One per channel property; hidden channels get the checkerboard placeholder.
    pub response_images: Vec<RgbaImage>,
    /// Number of queued tasks folded into this frame.
    pub coalesced: usize,
}

/// Renders frames from the current image and a set of channel properties.
/// Owns the per-channel cache; lives on the render worker thread.
pub struct Renderer {
    cache: ChannelCache,
    image: Option<Arc<Image>>,
    backend: Backend,
}

impl Renderer {
    pub fn new(backend: Backend) -> Self {
        Self {
            cache: ChannelCache::new(),
            image: None,
            backend,
        }
    }

    /// Replace the base image. Every cached channel is dropped.
    pub fn set_image(&mut self, image: Arc<Image>) {
        log::debug!(
            "Render image set ({} backend): {}x{}x{}",
            self.backend.name(),
            image.width,
            image.height,
            image.channels
        );
        self.image = Some(image);
        self.cache.clear();
    }

    pub fn cache(&self) -> &ChannelCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn render(&mut self, properties: &[ChannelProperty]) -> Result<RenderResult, RenderError> {
        let image = self.image.clone().ok_or(RenderError::NoImage)?;

        let mut response_images = Vec::with_capacity(properties.len());
        for (index, property) in properties.iter().enumerate() {
            if !property.visible {
                response_images.push(response::placeholder());
                continue;
            }
            let raw = image
                .channel(index)
                .ok_or(RenderError::ChannelOutOfRange {
                    index,
                    channels: image.channels,
                })?;
            let (_, response) = self.cache.render_channel(index, property, &raw)?;
            response_images.push(response.clone());
        }

        let layers: Vec<_> = properties
            .iter()
            .enumerate()
            .filter(|(_, p)| p.visible)
            .filter_map(|(i, _)| self.cache.layer(i))
            .collect();
        let composited = composite::composite(&layers, image.width, image.height);

        Ok(RenderResult {
            composited,
            response_images,
            coalesced: 1,
        })
    }
}
