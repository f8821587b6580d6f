//! Multi-channel scientific image viewer core.
//!
//! Each image channel runs through its own filter pipeline, is tinted with a
//! color and composited additively. Rendering and file IO run on background
//! workers coordinated by [`model::Model`].

pub mod config;
pub mod filter;
pub mod loader;
pub mod media;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod settings;
