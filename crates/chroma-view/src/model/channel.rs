use serde::{Deserialize, Serialize};

use crate::filter::{FilterConfig, FilterKind, LocalNormParams, SigmoidNormParams};
use crate::pipeline::PipelineConfig;
use crate::render::colormap::DEFAULT_COLOR;

/// Display and processing settings for one image channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelProperty {
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_pipeline")]
    pub pipeline: PipelineConfig,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_true() -> bool {
    true
}

/// Local contrast normalization followed by a sigmoid curve.
pub fn default_pipeline() -> PipelineConfig {
    PipelineConfig::new(vec![
        FilterConfig::new(FilterKind::LocalNorm(LocalNormParams::default())),
        FilterConfig::new(FilterKind::SigmoidNorm(SigmoidNormParams::default())),
    ])
}

impl ChannelProperty {
    /// Fresh settings for the channel at `index`.
    pub fn new(index: usize) -> Self {
        Self {
            name: format!("Channel {index}"),
            color: default_color(),
            visible: true,
            pipeline: default_pipeline(),
        }
    }
}
