//! EXIF orientation lookup.
//!
//! Only the header region of a file is read and handed to the EXIF reader.
//! Anything unexpected (non-JPEG input, truncation, a missing tag, unknown
//! values) yields [`Rotation::None`].

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use exif::{In, Tag};
use tracing::trace;

use crate::models::Rotation;

/// Bytes read from the start of a file. An APP1 segment is at most 64KB, so
/// this covers it along with the usual APP0/ICC segments in front.
const HEADER_LIMIT: u64 = 128 * 1024;

/// Read the display rotation hint for `path`.
pub fn read_orientation(path: &Path) -> Rotation {
    let mut header = Vec::new();
    let read = File::open(path).and_then(|f| f.take(HEADER_LIMIT).read_to_end(&mut header));
    if let Err(e) = read {
        trace!(?path, error = %e, "Orientation header unreadable");
        return Rotation::None;
    }
    let rotation = orientation_from_bytes(&header);
    trace!(?path, degrees = rotation.degrees(), "Read orientation");
    rotation
}

/// Rotation hint from the leading bytes of an image file.
pub fn orientation_from_bytes(data: &[u8]) -> Rotation {
    match orientation_tag(data) {
        Some(3) => Rotation::Cw180,
        Some(6) => Rotation::Cw90,
        Some(8) => Rotation::Cw270,
        _ => Rotation::None,
    }
}

fn orientation_tag(data: &[u8]) -> Option<u32> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(data))
        .ok()?;
    exif.get_field(Tag::Orientation, In::PRIMARY)?
        .value
        .get_uint(0)
}
