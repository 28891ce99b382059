pub mod bitmap;
pub mod orientation;

pub use bitmap::{sharpen, BitmapDecoder, DecodeError};
pub use orientation::read_orientation;
