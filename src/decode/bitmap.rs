//! Pixel decoding at a target width.
//!
//! JPEGs are decoded through `jpeg_decoder` with DCT scaling so that a 50px
//! placeholder of a 24MP photo never materialises the full-size raster. PNG
//! has no reduced-resolution decode and is resized after decoding. Output is
//! always RGBA, already rotated into display orientation.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, Rgba, RgbaImage, RgbImage};
use jpeg_decoder::PixelFormat as JpegPixelFormat;
use thiserror::Error;
use tracing::trace;

use crate::models::Rotation;

/// Filter used for every resize so output is deterministic.
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// 3x3 sharpening kernel applied to previews. Weights sum to one.
const SHARPEN_KERNEL: [f32; 9] = [-0.5, -0.5, -0.5, -0.5, 5.0, -0.5, -0.5, -0.5, -0.5];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JPEG decode failed: {0}")]
    Jpeg(#[from] jpeg_decoder::Error),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("unsupported image format: {0:?}")]
    Unsupported(PathBuf),
    #[error("decoded image is empty: {0:?}")]
    Empty(PathBuf),
}

/// Decodes source photos. Shared by the loader, the upgrade worker and the
/// preview generator.
#[derive(Debug, Default)]
pub struct BitmapDecoder {
    decodes: AtomicU64,
}

impl BitmapDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `path` so that its stored width is at most `target_width`,
    /// then rotate by `rotation`. Images narrower than the target are never
    /// upscaled.
    pub fn decode(
        &self,
        path: &Path,
        target_width: Option<u32>,
        rotation: Rotation,
    ) -> Result<RgbaImage, DecodeError> {
        self.decodes.fetch_add(1, Ordering::Relaxed);

        let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let (img, (src_w, src_h)) = match image::guess_format(&bytes).ok() {
            Some(ImageFormat::Jpeg) => decode_jpeg(&bytes, target_width)?,
            Some(ImageFormat::Png) => {
                let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?;
                let dims = img.dimensions();
                (img, dims)
            }
            _ => return Err(DecodeError::Unsupported(path.to_path_buf())),
        };

        if src_w == 0 || src_h == 0 || img.width() == 0 || img.height() == 0 {
            return Err(DecodeError::Empty(path.to_path_buf()));
        }

        // Sizes derive from the source dimensions, not the DCT-scaled ones.
        let img = match target_width {
            Some(target) if src_w > target => {
                let (w, h) = scaled_dimensions(src_w, src_h, target);
                if img.dimensions() == (w, h) {
                    img
                } else {
                    img.resize_exact(w, h, RESIZE_FILTER)
                }
            }
            _ => img,
        };
        let img = rotate(img, rotation);

        trace!(
            ?path,
            src_w,
            src_h,
            width = img.width(),
            height = img.height(),
            rotation = rotation.degrees(),
            "Decoded bitmap"
        );
        Ok(img.into_rgba8())
    }

    /// Number of decode calls made so far.
    pub fn decode_count(&self) -> u64 {
        self.decodes.load(Ordering::Relaxed)
    }
}

/// Decode with the smallest DCT scale that is still at least `target_width`
/// wide. Pixel formats the scaled path can't express go through `image`.
/// Returns the decoded image along with the full source dimensions.
fn decode_jpeg(
    bytes: &[u8],
    target_width: Option<u32>,
) -> Result<(DynamicImage, (u32, u32)), DecodeError> {
    let mut decoder = jpeg_decoder::Decoder::new(Cursor::new(bytes));
    decoder.read_info()?;
    let source = decoder
        .info()
        .map(|info| (u32::from(info.width), u32::from(info.height)))
        .unwrap_or((0, 0));

    if let Some(target) = target_width {
        if source.0 > target {
            // The decoder settles on the first scale where either side meets
            // its request, so the height request is the full height: only
            // the width decides.
            let requested = target.clamp(1, u32::from(u16::MAX)) as u16;
            decoder.scale(requested, source.1 as u16)?;
        }
    }

    let pixels = decoder.decode()?;
    let decoded = decoder.info().and_then(|info| {
        let (w, h) = (u32::from(info.width), u32::from(info.height));
        match info.pixel_format {
            JpegPixelFormat::RGB24 => RgbImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
            JpegPixelFormat::L8 => GrayImage::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
            JpegPixelFormat::L16 | JpegPixelFormat::CMYK32 => None,
        }
    });

    match decoded {
        Some(img) => Ok((img, source)),
        None => Ok((image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?, source)),
    }
}

/// Width fixed to `target`, height scaled proportionally and floored.
pub fn scaled_dimensions(src_w: u32, src_h: u32, target: u32) -> (u32, u32) {
    let h = (u64::from(src_h) * u64::from(target) / u64::from(src_w.max(1))) as u32;
    (target.max(1), h.max(1))
}

pub fn rotate(img: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::None => img,
        Rotation::Cw90 => img.rotate90(),
        Rotation::Cw180 => img.rotate180(),
        Rotation::Cw270 => img.rotate270(),
    }
}

/// Sharpen the colour channels with a 3x3 convolution. Samples outside the
/// image are clamped to the nearest edge pixel; alpha is left untouched.
pub fn sharpen(src: &RgbaImage) -> RgbaImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let max_x = i64::from(w) - 1;
    let max_y = i64::from(h) - 1;

    RgbaImage::from_fn(w, h, |x, y| {
        let mut acc = [0f32; 3];
        for (k, weight) in SHARPEN_KERNEL.iter().enumerate() {
            let sx = (i64::from(x) + (k % 3) as i64 - 1).clamp(0, max_x) as u32;
            let sy = (i64::from(y) + (k / 3) as i64 - 1).clamp(0, max_y) as u32;
            let p = src.get_pixel(sx, sy);
            for (channel, sum) in acc.iter_mut().enumerate() {
                *sum += f32::from(p[channel]) * weight;
            }
        }
        let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        Rgba([to_u8(acc[0]), to_u8(acc[1]), to_u8(acc[2]), src.get_pixel(x, y)[3]])
    })
}
