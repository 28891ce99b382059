//! Image loading pipeline for a photo selection tool: tiered thumbnails,
//! EXIF orientation, disk and memory caches, and sharpened previews.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod decode;
pub mod image_loader;
pub mod models;
pub mod pipeline;
pub mod scanner;
pub mod thumbnails;

#[cfg(test)]
mod test_util;

pub use config::{PipelineConfig, StartupSettings};
pub use pipeline::{Category, LoadOutcome, Pipeline, PreviewError};
