//! Synthesized stand-in thumbnails for points whose image could not be
//! fetched, so baking never observes a missing handle.

use artmap_core::types::ThumbHandle;
use image::{Rgba, RgbaImage};

/// Longest label carried on a placeholder handle.
const LABEL_MAX_CHARS: usize = 12;

/// Fraction of the tile height taken by the darker header band.
const HEADER_FRAC: u32 = 5;

/// Build a placeholder tile for `filename` at the given pixel size: a solid
/// color derived deterministically from the filename, a darker header band,
/// and the truncated filename carried as handle metadata.
pub fn placeholder_thumb(filename: &str, size: u32) -> ThumbHandle {
    let size = size.max(1);
    let body = color_for(filename);
    let header = darken(body);

    let mut image = RgbaImage::from_pixel(size, size, body);
    let band = (size / HEADER_FRAC).max(1);
    for y in 0..band {
        for x in 0..size {
            image.put_pixel(x, y, header);
        }
    }

    ThumbHandle::placeholder(image, truncate_label(filename))
}

/// Deterministic mid-brightness color from an FNV-style filename hash.
fn color_for(filename: &str) -> Rgba<u8> {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in filename.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    // Keep each channel in 64..=191 so neither label overlays nor the
    // header band disappear into the fill.
    let r = 64 + (hash & 0x7f) as u8;
    let g = 64 + ((hash >> 8) & 0x7f) as u8;
    let b = 64 + ((hash >> 16) & 0x7f) as u8;
    Rgba([r, g, b, 255])
}

fn darken(color: Rgba<u8>) -> Rgba<u8> {
    Rgba([color.0[0] / 2, color.0[1] / 2, color.0[2] / 2, 255])
}

fn truncate_label(filename: &str) -> String {
    let stem = filename.rsplit('/').next().unwrap_or(filename);
    let stem = stem.split('.').next().unwrap_or(stem);
    stem.chars().take(LABEL_MAX_CHARS).collect()
}
