//! Synthetic photo fixtures shared by unit tests.

use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};

/// A JPEG marker segment with the given payload.
pub fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() + 2) as u16;
    let mut out = vec![0xFF, marker];
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// An `Exif` APP1 segment whose IFD0 holds only an orientation tag.
pub fn exif_app1(orientation: u16, big_endian: bool) -> Vec<u8> {
    let u16b = |v: u16| {
        if big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    };
    let u32b = |v: u32| {
        if big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    };

    let mut tiff = Vec::new();
    tiff.extend_from_slice(if big_endian { b"MM" } else { b"II" });
    tiff.extend_from_slice(&u16b(42));
    tiff.extend_from_slice(&u32b(8));
    tiff.extend_from_slice(&u16b(1));
    tiff.extend_from_slice(&u16b(0x0112));
    tiff.extend_from_slice(&u16b(3));
    tiff.extend_from_slice(&u32b(1));
    tiff.extend_from_slice(&u16b(orientation));
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&u32b(0));

    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff);
    segment(0xE1, &payload)
}

/// Left half red, right half blue.
pub fn split_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    })
}

/// Encode `img` as JPEG, optionally with an orientation tag right after SOI.
pub fn jpeg_bytes(img: &RgbImage, orientation: Option<u16>) -> Vec<u8> {
    let mut encoded = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut encoded, 95);
    img.write_with_encoder(encoder).unwrap();

    match orientation {
        Some(value) => {
            let mut out = encoded[..2].to_vec();
            out.extend_from_slice(&exif_app1(value, false));
            out.extend_from_slice(&encoded[2..]);
            out
        }
        None => encoded,
    }
}

pub fn write_jpeg(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    write_jpeg_oriented(dir, name, &split_image(width, height), None)
}

pub fn write_jpeg_oriented(
    dir: &Path,
    name: &str,
    img: &RgbImage,
    orientation: Option<u16>,
) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, jpeg_bytes(img, orientation)).unwrap();
    path
}

pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    split_image(width, height)
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();
    path
}

/// True when `pixel` is clearly red (tolerant of JPEG ringing).
pub fn is_red(pixel: &image::Rgba<u8>) -> bool {
    pixel[0] > 180 && pixel[2] < 90
}

pub fn is_blue(pixel: &image::Rgba<u8>) -> bool {
    pixel[2] > 180 && pixel[0] < 90
}
