use std::collections::hash_map::Entry;

use image::RgbaImage;
use rustc_hash::FxHashMap;

use super::RenderError;
use super::colormap::{ColorLayer, colorize, parse_hex};
use super::response::response_image;
use crate::media::Plane;
use crate::model::channel::ChannelProperty;
use crate::pipeline::Pipeline;

struct CacheEntry {
    pipeline: Pipeline,
    color: String,
    /// Raw channel normalized to `[0, 1]`, kept so config edits skip re-extraction.
    input: Plane,
    layer: ColorLayer,
    response: RgbaImage,
}

/// Per-channel memoized render outputs, owned by the render worker.
///
/// Entries are only valid for the image they were built from; the owner
/// clears the cache whenever the base image changes.
#[derive(Default)]
pub struct ChannelCache {
    entries: FxHashMap<usize, CacheEntry>,
}

impl ChannelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Colorized output and response image for one channel, recomputed only
    /// when the pipeline config or color differs from the cached entry.
    pub fn render_channel(
        &mut self,
        index: usize,
        property: &ChannelProperty,
        raw: &Plane,
    ) -> Result<(&ColorLayer, &RgbaImage), RenderError> {
        let rgb = parse_hex(&property.color)?;

        let entry = match self.entries.entry(index) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                let pipeline_changed = entry.pipeline.update(&property.pipeline);
                if pipeline_changed || entry.color != property.color {
                    log::debug!("Channel {index}: recomputing (pipeline changed: {pipeline_changed})");
                    let output = entry.pipeline.apply(&entry.input);
                    entry.layer = colorize(&output, rgb);
                    entry.response = response_image(&entry.input, &output, rgb);
                    entry.color.clone_from(&property.color);
                }
                entry
            }
            Entry::Vacant(vacant) => {
                log::debug!("Channel {index}: building cache entry");
                let input = raw.normalized();
                let mut pipeline = Pipeline::new(&property.pipeline);
                let output = pipeline.apply(&input);
                let layer = colorize(&output, rgb);
                let response = response_image(&input, &output, rgb);
                vacant.insert(CacheEntry {
                    pipeline,
                    color: property.color.clone(),
                    input,
                    layer,
                    response,
                })
            }
        };
        Ok((&entry.layer, &entry.response))
    }

    /// Cached colorized output, if the channel has been rendered.
    pub fn layer(&self, index: usize) -> Option<&ColorLayer> {
        self.entries.get(&index).map(|e| &e.layer)
    }

    /// Filter stages executed for this channel since its entry was created.
    pub fn stage_runs(&self, index: usize) -> Option<usize> {
        self.entries.get(&index).map(|e| e.pipeline.stage_runs())
    }

    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
