use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::channel::ChannelProperty;
use crate::pipeline::PipelineConfig;

const CHANNEL_PROPS_KEY: &str = "channel_props";

/// Saved channel configuration. Image data is never part of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    pub channel_props: Vec<ChannelProperty>,
}

/// Fields recovered from one saved channel entry. `None` leaves the current
/// value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub visible: Option<bool>,
    pub pipeline: Option<PipelineConfig>,
}

impl ChannelPatch {
    pub fn apply_to(self, property: &mut ChannelProperty) {
        if let Some(name) = self.name {
            property.name = name;
        }
        if let Some(color) = self.color {
            property.color = color;
        }
        if let Some(visible) = self.visible {
            property.visible = visible;
        }
        if let Some(pipeline) = self.pipeline {
            property.pipeline = pipeline;
        }
    }
}

/// Tolerant parse of a saved configuration document.
///
/// Unrecognized keys and values of the wrong type are skipped and returned
/// as dotted paths alongside the patches. Only a document that is not an
/// object with a `channel_props` list is an error.
pub fn parse_channel_patches(doc: &Value) -> Result<(Vec<ChannelPatch>, Vec<String>)> {
    let Some(root) = doc.as_object() else {
        anyhow::bail!("Configuration must be a JSON object");
    };
    let Some(entries) = root.get(CHANNEL_PROPS_KEY).and_then(Value::as_array) else {
        anyhow::bail!("Configuration has no '{CHANNEL_PROPS_KEY}' list");
    };

    let mut skipped: Vec<String> = root
        .keys()
        .filter(|k| k.as_str() != CHANNEL_PROPS_KEY)
        .cloned()
        .collect();

    let mut patches = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let mut patch = ChannelPatch::default();
        let Some(fields) = entry.as_object() else {
            skipped.push(format!("{CHANNEL_PROPS_KEY}.{i}"));
            patches.push(patch);
            continue;
        };
        for (key, value) in fields {
            let ok = match key.as_str() {
                "name" => value.as_str().map(|s| patch.name = Some(s.to_string())).is_some(),
                "color" => value.as_str().map(|s| patch.color = Some(s.to_string())).is_some(),
                "visible" => value.as_bool().map(|b| patch.visible = Some(b)).is_some(),
                "pipeline" => serde_json::from_value::<PipelineConfig>(value.clone())
                    .map(|p| patch.pipeline = Some(p))
                    .is_ok(),
                _ => false,
            };
            if !ok {
                skipped.push(format!("{CHANNEL_PROPS_KEY}.{i}.{key}"));
            }
        }
        patches.push(patch);
    }

    for key in &skipped {
        log::warn!("Ignoring unrecognized configuration entry '{key}'");
    }
    Ok((patches, skipped))
}

pub fn read_config(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let doc = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(doc)
}

pub fn write_config(path: &Path, config: &ViewerConfig) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write config {}", path.display()))?;
    log::info!("Saved channel configuration to {}", path.display());
    Ok(())
}
