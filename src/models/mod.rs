pub mod grid_model;
pub mod image_entry;

pub use grid_model::*;
pub use image_entry::*;
